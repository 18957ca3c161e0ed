//! Shadow joystick state written by mapping callbacks and blended into
//! emulated joystick queries.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub const AXIS_MIN: u16 = 0;
pub const AXIS_MAX: u16 = 65535;
pub const AXIS_CENTER: u16 = 32767;
/// POV value reported when the hat is not pressed.
pub const POV_CENTERED: u32 = 0xFFFF;

pub const BUTTON_COUNT: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    R,
    U,
    V,
}

impl Axis {
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::R, Axis::U, Axis::V];

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualJoyState {
    pub axes: [u16; 6],
    pub buttons: u32,
    pub pov: u32,
}

impl VirtualJoyState {
    pub const NEUTRAL: Self = Self {
        axes: [AXIS_CENTER; 6],
        buttons: 0,
        pov: POV_CENTERED,
    };

    #[inline]
    pub fn axis(&self, axis: Axis) -> u16 {
        self.axes[axis.index()]
    }

    #[inline]
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for VirtualJoyState {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

type Activator = Box<dyn Fn() + Send + Sync>;

/// Mutex-guarded [`VirtualJoyState`] plus the hook that installs joystick
/// emulation the first time a value is written.
pub struct VirtualJoystick {
    state: Mutex<VirtualJoyState>,
    activator: Mutex<Option<Activator>>,
    active: AtomicBool,
}

impl VirtualJoystick {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualJoyState::NEUTRAL),
            activator: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Registers the callback run on the first write after activation was
    /// reset.
    pub fn set_activator(&self, activate: impl Fn() + Send + Sync + 'static) {
        *self.activator.lock() = Some(Box::new(activate));
        self.active.store(false, Ordering::Release);
    }

    pub fn clear_activator(&self) {
        *self.activator.lock() = None;
        self.active.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn ensure_active(&self) {
        if self.active.load(Ordering::Acquire) {
            return;
        }
        let activator = self.activator.lock();
        if let Some(activate) = activator.as_ref()
            && !self.active.swap(true, Ordering::AcqRel)
        {
            activate();
        }
    }

    pub fn set_axis(&self, axis: Axis, value: u16) {
        self.ensure_active();
        self.state.lock().axes[axis.index()] = value;
    }

    /// Sets or clears button `index` (0..=31). Other indices are ignored.
    pub fn set_button(&self, index: u8, down: bool) {
        if index >= BUTTON_COUNT {
            return;
        }
        self.ensure_active();
        let mut state = self.state.lock();
        if down {
            state.buttons |= 1 << index;
        } else {
            state.buttons &= !(1 << index);
        }
    }

    pub fn set_pov(&self, value: u32) {
        self.ensure_active();
        self.state.lock().pov = value;
    }

    /// Axes centered, buttons released, POV centered.
    pub fn reset(&self) {
        *self.state.lock() = VirtualJoyState::NEUTRAL;
    }

    /// Re-centers the axes only, leaving buttons and POV alone.
    pub fn center_axes(&self) {
        self.state.lock().axes = [AXIS_CENTER; 6];
    }

    #[inline]
    pub fn snapshot(&self) -> VirtualJoyState {
        *self.state.lock()
    }
}

impl Default for VirtualJoystick {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_starts_neutral() {
        let joy = VirtualJoystick::new();
        assert!(joy.snapshot().is_neutral());
        assert_eq!(joy.snapshot().pov, POV_CENTERED);
    }

    #[test]
    fn test_button_bits() {
        let joy = VirtualJoystick::new();
        joy.set_button(0, true);
        joy.set_button(31, true);
        assert_eq!(joy.snapshot().buttons, 0x8000_0001);

        joy.set_button(0, false);
        assert_eq!(joy.snapshot().buttons, 0x8000_0000);

        // Out of range is a no-op
        joy.set_button(32, true);
        assert_eq!(joy.snapshot().buttons, 0x8000_0000);
    }

    #[test]
    fn test_center_axes_keeps_buttons() {
        let joy = VirtualJoystick::new();
        joy.set_axis(Axis::X, 0);
        joy.set_axis(Axis::V, AXIS_MAX);
        joy.set_button(3, true);
        joy.set_pov(9000);

        joy.center_axes();
        let state = joy.snapshot();
        assert_eq!(state.axes, [AXIS_CENTER; 6]);
        assert_eq!(state.buttons, 1 << 3);
        assert_eq!(state.pov, 9000);

        joy.reset();
        assert!(joy.snapshot().is_neutral());
    }

    #[test]
    fn test_activator_runs_once() {
        let joy = VirtualJoystick::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        joy.set_activator(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!joy.is_active());
        joy.set_axis(Axis::Y, 100);
        joy.set_button(1, true);
        joy.set_pov(0);
        assert!(joy.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Reset leaves emulation installed
        joy.reset();
        joy.set_button(1, true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_writes_without_activator_still_land() {
        let joy = VirtualJoystick::new();
        joy.set_axis(Axis::Z, 1234);
        assert_eq!(joy.snapshot().axis(Axis::Z), 1234);
        assert!(!joy.is_active());
    }
}
