//! The control-mapping engine: resolves every mapped code once per tick and
//! runs its callbacks on state transitions.

mod binding;
mod motion;
mod pad_poll;

pub use binding::{Binding, Callback, EdgeCallbacks, MoveCallback};
pub use motion::{DEFAULT_MOUSE_MOVE_DEADZONE, DEFAULT_MOUSE_MOVE_SCALE, MouseMotion, scale_mouse_delta};
pub use pad_poll::GamepadPoller;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};
use smallvec::SmallVec;

use crate::capability::{CapabilityTable, OverrideTable};
use crate::code::{InputClass, InputCode};
use crate::emulation::gamepad::GamepadState;
use crate::error::ShimError;
use crate::inject::MouseButton;

/// Raw polled input the engine reads when no override is active.
pub trait InputSource: Send + Sync {
    fn key_down(&self, vk: u16) -> bool;
    fn mouse_button_down(&self, button: MouseButton) -> bool;
    fn cursor_pos(&self) -> Option<(i32, i32)>;
}

struct KeyState {
    is_down: bool,
    was_down: bool,
    binding: Binding,
}

impl KeyState {
    fn new(binding: Binding) -> Self {
        Self {
            is_down: false,
            was_down: false,
            binding,
        }
    }

    #[inline]
    fn dispatch(&mut self) {
        if self.is_down && !self.was_down {
            self.binding.fire_press();
        }
        if self.is_down {
            self.binding.fire_hold();
        }
        if !self.is_down && self.was_down {
            self.binding.fire_release();
        }
        self.was_down = self.is_down;
    }
}

pub struct ControlMapper {
    entries: BTreeMap<InputCode, KeyState>,
    capabilities: Arc<CapabilityTable>,
    overrides: Arc<OverrideTable>,
    input: Arc<dyn InputSource>,
    gamepad: GamepadPoller,
    motion: MouseMotion,
}

impl ControlMapper {
    pub fn new(
        capabilities: Arc<CapabilityTable>,
        overrides: Arc<OverrideTable>,
        input: Arc<dyn InputSource>,
        gamepad: GamepadPoller,
    ) -> Self {
        Self {
            entries: BTreeMap::new(),
            capabilities,
            overrides,
            input,
            gamepad,
            motion: MouseMotion::new(),
        }
    }

    /// Registers or replaces the binding for `code` with cleared edge state
    /// and no override.
    pub fn map(&mut self, code: InputCode, binding: Binding) -> Result<(), ShimError> {
        match code.class() {
            InputClass::Unknown => return Err(ShimError::ReservedCode(code)),
            InputClass::MouseMove if !binding.is_move() => {
                return Err(ShimError::BindingMismatch);
            }
            InputClass::MouseMove => self.motion.rebase(),
            _ if binding.is_move() => return Err(ShimError::BindingMismatch),
            _ => {}
        }

        self.entries.insert(code, KeyState::new(binding));
        self.overrides.remove(code);
        self.capabilities.insert(code);
        debug!("mapped {}", code);
        Ok(())
    }

    /// [`ControlMapper::map`] by binding name.
    pub fn map_named(&mut self, name: &str, binding: Binding) -> Result<InputCode, ShimError> {
        let code: InputCode = name.parse()?;
        self.map(code, binding)?;
        Ok(code)
    }

    #[inline]
    pub fn is_mapped(&self, code: InputCode) -> bool {
        self.entries.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forces `code` to `down` until overrides are cleared. Ignored for
    /// unmapped codes.
    pub fn notify_physical(&self, code: InputCode, down: bool) {
        if self.is_mapped(code) {
            self.overrides.set(code, down);
        }
    }

    pub fn clear_overrides(&self) {
        self.overrides.clear();
    }

    /// Codes that are down now or were down on the previous tick.
    pub fn held_codes(&self) -> SmallVec<[InputCode; 16]> {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_down || state.was_down)
            .map(|(&code, _)| code)
            .collect()
    }

    /// Fires release callbacks for everything held, then drops every
    /// mapping. Calling it again does nothing.
    pub fn reset(&mut self) {
        for state in self.entries.values_mut() {
            if state.is_down || state.was_down {
                state.binding.fire_release();
            }
        }
        if !self.entries.is_empty() {
            debug!("cleared {} mappings", self.entries.len());
        }
        self.entries.clear();
        self.capabilities.clear();
        self.overrides.clear();
        self.motion.rebase();
    }

    pub fn set_mouse_move_scale(&mut self, scale: f32) {
        self.motion.set_scale(scale);
    }

    pub fn mouse_move_scale(&self) -> f32 {
        self.motion.scale()
    }

    pub fn set_mouse_move_deadzone(&mut self, deadzone: i32) {
        self.motion.set_deadzone(deadzone);
    }

    pub fn mouse_move_deadzone(&self) -> i32 {
        self.motion.deadzone()
    }

    /// One polling cycle: resolve, detect edges, dispatch.
    pub fn tick(&mut self) {
        let pad = if self.capabilities.any_gamepad_mapped() {
            self.gamepad.poll()
        } else {
            None
        };

        for (&code, state) in self.entries.iter_mut() {
            match code.class() {
                InputClass::MouseMove => {
                    let delta = self
                        .input
                        .cursor_pos()
                        .and_then(|pos| self.motion.sample(pos));
                    if let Some((dx, dy)) = delta {
                        trace!("mouse move {} {}", dx, dy);
                        state.binding.fire_move(dx, dy);
                    }
                    continue;
                }
                InputClass::Keyboard => {
                    state.is_down = match self.overrides.get(code) {
                        Some(forced) => forced,
                        None => code
                            .virtual_key()
                            .is_some_and(|vk| self.input.key_down(vk)),
                    };
                }
                InputClass::MouseButton => {
                    state.is_down = match self.overrides.get(code) {
                        Some(forced) => forced,
                        None => MouseButton::from_code(code)
                            .is_some_and(|button| self.input.mouse_button_down(button)),
                    };
                }
                InputClass::Gamepad => {
                    state.is_down = pad.is_some_and(|pad: GamepadState| {
                        pad.is_pressed(code, state.was_down)
                    });
                }
                InputClass::Unknown => state.is_down = false,
            }
            state.dispatch();
        }
    }
}

impl std::fmt::Debug for ControlMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlMapper")
            .field("mapped", &self.entries.keys().collect::<Vec<_>>())
            .field("scale", &self.motion.scale())
            .field("deadzone", &self.motion.deadzone())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::emulation::gamepad::{ERROR_DEVICE_NOT_CONNECTED, ERROR_SUCCESS, GamepadApi, XInputState};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Raw {
        keys: Mutex<HashSet<u16>>,
        buttons: Mutex<HashSet<MouseButton>>,
        cursor: Mutex<(i32, i32)>,
        pad: Mutex<Option<GamepadState>>,
    }

    impl InputSource for Raw {
        fn key_down(&self, vk: u16) -> bool {
            self.keys.lock().contains(&vk)
        }
        fn mouse_button_down(&self, button: MouseButton) -> bool {
            self.buttons.lock().contains(&button)
        }
        fn cursor_pos(&self) -> Option<(i32, i32)> {
            Some(*self.cursor.lock())
        }
    }

    impl GamepadApi for Raw {
        fn get_state(&self, _: u32, state: &mut XInputState) -> u32 {
            match *self.pad.lock() {
                Some(pad) => {
                    state.gamepad = pad;
                    ERROR_SUCCESS
                }
                None => ERROR_DEVICE_NOT_CONNECTED,
            }
        }
    }

    fn mapper() -> (ControlMapper, Arc<Raw>) {
        let raw = Arc::new(Raw::default());
        let poller = GamepadPoller::new(raw.clone(), ManualClock::new(0));
        let mapper = ControlMapper::new(
            Arc::new(CapabilityTable::new()),
            Arc::new(OverrideTable::new()),
            raw.clone(),
            poller,
        );
        (mapper, raw)
    }

    fn counters() -> [Arc<AtomicUsize>; 3] {
        std::array::from_fn(|_| Arc::new(AtomicUsize::new(0)))
    }

    fn counting_binding(c: &[Arc<AtomicUsize>; 3]) -> Binding {
        let (p, h, r) = (c[0].clone(), c[1].clone(), c[2].clone());
        Binding::edge()
            .on_press(move || {
                p.fetch_add(1, Ordering::SeqCst);
            })
            .on_hold(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .on_release(move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
    }

    fn counts(c: &[Arc<AtomicUsize>; 3]) -> [usize; 3] {
        [
            c[0].load(Ordering::SeqCst),
            c[1].load(Ordering::SeqCst),
            c[2].load(Ordering::SeqCst),
        ]
    }

    #[test]
    fn test_edge_dispatch_order() {
        let (mut mapper, raw) = mapper();
        let c = counters();
        mapper.map(InputCode(0x41), counting_binding(&c)).unwrap();

        mapper.tick();
        assert_eq!(counts(&c), [0, 0, 0]);

        raw.keys.lock().insert(0x41);
        mapper.tick();
        assert_eq!(counts(&c), [1, 1, 0]);
        mapper.tick();
        assert_eq!(counts(&c), [1, 2, 0]);

        raw.keys.lock().clear();
        mapper.tick();
        assert_eq!(counts(&c), [1, 2, 1]);
        mapper.tick();
        assert_eq!(counts(&c), [1, 2, 1]);
    }

    #[test]
    fn test_override_beats_polling() {
        let (mut mapper, raw) = mapper();
        let c = counters();
        mapper.map(InputCode::MOUSE_RIGHT, counting_binding(&c)).unwrap();

        mapper.notify_physical(InputCode::MOUSE_RIGHT, true);
        mapper.tick();
        assert_eq!(counts(&c)[0], 1);

        // Raw says down, override still says up
        raw.buttons.lock().insert(MouseButton::Right);
        mapper.notify_physical(InputCode::MOUSE_RIGHT, false);
        mapper.tick();
        assert_eq!(counts(&c)[2], 1);

        mapper.clear_overrides();
        mapper.tick();
        assert_eq!(counts(&c)[0], 2);
    }

    #[test]
    fn test_notify_ignores_unmapped_codes() {
        let (mapper, _) = mapper();
        mapper.notify_physical(InputCode(0x42), true);
        assert!(mapper.overrides.is_empty());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (mut mapper, raw) = mapper();
        let c = counters();
        mapper.map(InputCode(0x41), counting_binding(&c)).unwrap();
        raw.keys.lock().insert(0x41);
        mapper.tick();

        mapper.reset();
        assert_eq!(counts(&c)[2], 1);
        mapper.reset();
        assert_eq!(counts(&c)[2], 1);
        assert!(mapper.is_empty());
        assert!(mapper.capabilities.is_empty());
    }

    #[test]
    fn test_map_resets_edge_state() {
        let (mut mapper, raw) = mapper();
        let c = counters();
        mapper.map(InputCode(0x41), counting_binding(&c)).unwrap();
        raw.keys.lock().insert(0x41);
        mapper.tick();
        assert_eq!(mapper.held_codes().as_slice(), &[InputCode(0x41)]);

        let fresh = counters();
        mapper.map(InputCode(0x41), counting_binding(&fresh)).unwrap();
        assert!(mapper.held_codes().is_empty());
        mapper.tick();
        // Still physically down, so the new binding sees a fresh press
        assert_eq!(counts(&fresh), [1, 1, 0]);
    }

    #[test]
    fn test_map_rejects_reserved_and_mismatched() {
        let (mut mapper, _) = mapper();
        assert!(matches!(
            mapper.map(InputCode::NONE, Binding::edge()),
            Err(ShimError::ReservedCode(_))
        ));
        // Above the virtual-key range the hooks never report
        assert!(matches!(
            mapper.map(InputCode(0x100), Binding::edge()),
            Err(ShimError::ReservedCode(_))
        ));
        assert!(matches!(
            mapper.map(InputCode::MOUSE_MOVE, Binding::edge()),
            Err(ShimError::BindingMismatch)
        ));
        assert!(matches!(
            mapper.map(InputCode(0x41), Binding::movement(|_, _| {})),
            Err(ShimError::BindingMismatch)
        ));
        assert!(matches!(
            mapper.map_named("warp", Binding::edge()),
            Err(ShimError::UnknownInput(_))
        ));
        assert_eq!(
            mapper.map_named("space", Binding::edge()).unwrap(),
            InputCode(0x20)
        );
    }

    #[test]
    fn test_mouse_move_callback() {
        let (mut mapper, raw) = mapper();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mapper
            .map(
                InputCode::MOUSE_MOVE,
                Binding::movement(move |dx, dy| sink.lock().push((dx, dy))),
            )
            .unwrap();

        *raw.cursor.lock() = (100, 100);
        mapper.tick();
        *raw.cursor.lock() = (150, 90);
        mapper.tick();
        mapper.tick();

        assert_eq!(*seen.lock(), vec![(10, -2)]);
        // Moves never count as held
        assert!(mapper.held_codes().is_empty());
    }

    #[test]
    fn test_trigger_hysteresis_through_tick() {
        let (mut mapper, raw) = mapper();
        let c = counters();
        mapper.map(InputCode::PAD_LT, counting_binding(&c)).unwrap();

        let pad = |lt| GamepadState {
            left_trigger: lt,
            ..Default::default()
        };

        *raw.pad.lock() = Some(pad(25));
        mapper.tick();
        assert_eq!(counts(&c)[0], 0);

        *raw.pad.lock() = Some(pad(31));
        mapper.tick();
        assert_eq!(counts(&c)[0], 1);

        *raw.pad.lock() = Some(pad(25));
        mapper.tick();
        assert_eq!(counts(&c), [1, 2, 0]);

        *raw.pad.lock() = Some(pad(19));
        mapper.tick();
        assert_eq!(counts(&c)[2], 1);
    }

    #[test]
    fn test_lost_gamepad_force_releases() {
        let (mut mapper, raw) = mapper();
        let c = counters();
        mapper.map(InputCode::PAD_A, counting_binding(&c)).unwrap();

        *raw.pad.lock() = Some(GamepadState {
            buttons: 0x1000,
            ..Default::default()
        });
        mapper.tick();
        assert_eq!(counts(&c)[0], 1);

        *raw.pad.lock() = None;
        mapper.tick();
        assert_eq!(counts(&c)[2], 1);
    }

    #[test]
    fn test_mouse_tunables() {
        let (mut mapper, _) = mapper();
        assert_eq!(mapper.mouse_move_scale(), DEFAULT_MOUSE_MOVE_SCALE);
        mapper.set_mouse_move_scale(-2.0);
        mapper.set_mouse_move_deadzone(-1);
        assert_eq!(mapper.mouse_move_scale(), 0.0);
        assert_eq!(mapper.mouse_move_deadzone(), 0);
    }
}
