//! Concurrent lookup tables shared between the mapping engine and the
//! OS-facing hooks and trampolines.
//!
//! Both tables are read from hook threads while the polling thread owns the
//! mapping engine, so they use lock-free `scc` containers.

use std::sync::atomic::{AtomicUsize, Ordering};

use smallvec::SmallVec;

use crate::code::InputCode;

/// Registry of codes that currently have a binding.
///
/// The hook layer asks it whether to swallow an event and the emulation
/// layer asks it which real gamepad bits to hide.
#[derive(Default)]
pub struct CapabilityTable {
    codes: scc::HashSet<InputCode>,
    gamepad_codes: AtomicUsize,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn is_mapped(&self, code: InputCode) -> bool {
        self.codes.contains_sync(&code)
    }

    /// True when any code in the gamepad class is mapped.
    #[inline(always)]
    pub fn any_gamepad_mapped(&self) -> bool {
        self.gamepad_codes.load(Ordering::Acquire) > 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Snapshot of all mapped codes, sorted.
    pub fn codes(&self) -> SmallVec<[InputCode; 16]> {
        let mut out = SmallVec::new();
        self.codes.iter_sync(|&code| {
            out.push(code);
            true
        });
        out.sort_unstable();
        out
    }

    pub(crate) fn insert(&self, code: InputCode) {
        if self.codes.insert_sync(code).is_ok() && code.is_gamepad() {
            self.gamepad_codes.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn clear(&self) {
        self.codes.clear_sync();
        self.gamepad_codes.store(0, Ordering::Release);
    }
}

/// Hook-supplied states that pre-empt polling for a code.
///
/// Written from the hook threads and read by the polling tick. Entries stay
/// until [`OverrideTable::clear`] is called.
#[derive(Default)]
pub struct OverrideTable {
    states: scc::HashMap<InputCode, bool>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, code: InputCode, down: bool) {
        self.states.upsert_sync(code, down);
    }

    /// Forced state for `code`, if the hook layer has reported one.
    #[inline]
    pub fn get(&self, code: InputCode) -> Option<bool> {
        self.states.read_sync(&code, |_, down| *down)
    }

    #[inline]
    pub fn remove(&self, code: InputCode) {
        let _ = self.states.remove_sync(&code);
    }

    pub fn clear(&self) {
        self.states.clear_sync();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_maps_nothing() {
        let table = CapabilityTable::new();
        assert!(table.is_empty());
        assert!(!table.is_mapped(InputCode(0x41)));
        assert!(!table.any_gamepad_mapped());
    }

    #[test]
    fn test_gamepad_count_ignores_duplicates() {
        let table = CapabilityTable::new();
        table.insert(InputCode::PAD_A);
        table.insert(InputCode::PAD_A);
        table.insert(InputCode(0x20));
        assert_eq!(table.len(), 2);
        assert!(table.any_gamepad_mapped());

        table.clear();
        assert!(table.is_empty());
        assert!(!table.any_gamepad_mapped());
    }

    #[test]
    fn test_codes_snapshot_is_sorted() {
        let table = CapabilityTable::new();
        table.insert(InputCode(0x41));
        table.insert(InputCode::MOUSE_LEFT);
        table.insert(InputCode::PAD_RT);
        assert_eq!(
            table.codes().as_slice(),
            &[InputCode::PAD_RT, InputCode::MOUSE_LEFT, InputCode(0x41)]
        );
    }

    #[test]
    fn test_override_last_write_wins() {
        let overrides = OverrideTable::new();
        assert_eq!(overrides.get(InputCode(0x41)), None);

        overrides.set(InputCode(0x41), true);
        overrides.set(InputCode(0x41), false);
        assert_eq!(overrides.get(InputCode(0x41)), Some(false));

        overrides.clear();
        assert!(overrides.is_empty());
    }
}
