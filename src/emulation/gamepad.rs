//! XInput-class gamepad layout, press detection and suppression of
//! remapped controls in emulated `XInputGetState` results.

use std::sync::Arc;

use crate::capability::CapabilityTable;
use crate::code::InputCode;

pub const ERROR_SUCCESS: u32 = 0;
pub const ERROR_BAD_ARGUMENTS: u32 = 160;
pub const ERROR_DEVICE_NOT_CONNECTED: u32 = 1167;

/// Gamepad user slots probed for a connected controller.
pub const USER_SLOTS: u32 = 4;

/// Trigger press threshold on the 0..=255 range.
pub const TRIGGER_PRESS: u8 = 30;
/// Trigger release threshold; a held trigger stays down at or above this.
pub const TRIGGER_RELEASE: u8 = 20;
pub const LEFT_THUMB_PRESS: i16 = 7849;
pub const LEFT_THUMB_RELEASE: i16 = 5887;
pub const RIGHT_THUMB_PRESS: i16 = 8689;
pub const RIGHT_THUMB_RELEASE: i16 = 6517;

/// Known XInput module names, most preferred first.
pub const XINPUT_MODULES: [&str; 5] = [
    "xinput1_4.dll",
    "xinput1_3.dll",
    "xinput9_1_0.dll",
    "xinput1_2.dll",
    "xinput1_1.dll",
];

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GamepadState {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// `XINPUT_STATE` as laid out by the OS.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XInputState {
    pub packet_number: u32,
    pub gamepad: GamepadState,
}

/// Real (or fake) `XInputGetState`.
pub trait GamepadApi: Send + Sync {
    fn get_state(&self, user_index: u32, state: &mut XInputState) -> u32;

    /// Drops the loaded XInput library, if any.
    fn release(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickAxis {
    X,
    Y,
}

/// Physical control a gamepad-class code refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadControl {
    Button(u16),
    LeftTrigger,
    RightTrigger,
    Thumb {
        stick: Stick,
        axis: StickAxis,
        positive: bool,
    },
}

const BUTTON_MAP: [(InputCode, u16); 14] = [
    (InputCode::PAD_A, 0x1000),
    (InputCode::PAD_B, 0x2000),
    (InputCode::PAD_X, 0x4000),
    (InputCode::PAD_Y, 0x8000),
    (InputCode::PAD_LB, 0x0100),
    (InputCode::PAD_RB, 0x0200),
    (InputCode::PAD_LS_CLICK, 0x0040),
    (InputCode::PAD_RS_CLICK, 0x0080),
    (InputCode::PAD_BACK, 0x0020),
    (InputCode::PAD_START, 0x0010),
    (InputCode::PAD_DPAD_UP, 0x0001),
    (InputCode::PAD_DPAD_DOWN, 0x0002),
    (InputCode::PAD_DPAD_LEFT, 0x0004),
    (InputCode::PAD_DPAD_RIGHT, 0x0008),
];

impl PadControl {
    pub fn for_code(code: InputCode) -> Option<Self> {
        if let Some(&(_, mask)) = BUTTON_MAP.iter().find(|(c, _)| *c == code) {
            return Some(PadControl::Button(mask));
        }
        let thumb = |stick, axis, positive| {
            Some(PadControl::Thumb {
                stick,
                axis,
                positive,
            })
        };
        match code {
            InputCode::PAD_LT => Some(PadControl::LeftTrigger),
            InputCode::PAD_RT => Some(PadControl::RightTrigger),
            InputCode::PAD_LS_UP => thumb(Stick::Left, StickAxis::Y, true),
            InputCode::PAD_LS_DOWN => thumb(Stick::Left, StickAxis::Y, false),
            InputCode::PAD_LS_LEFT => thumb(Stick::Left, StickAxis::X, false),
            InputCode::PAD_LS_RIGHT => thumb(Stick::Left, StickAxis::X, true),
            InputCode::PAD_RS_UP => thumb(Stick::Right, StickAxis::Y, true),
            InputCode::PAD_RS_DOWN => thumb(Stick::Right, StickAxis::Y, false),
            InputCode::PAD_RS_LEFT => thumb(Stick::Right, StickAxis::X, false),
            InputCode::PAD_RS_RIGHT => thumb(Stick::Right, StickAxis::X, true),
            _ => None,
        }
    }
}

#[inline]
pub fn trigger_pressed(value: u8, was_down: bool) -> bool {
    value >= if was_down { TRIGGER_RELEASE } else { TRIGGER_PRESS }
}

#[inline]
pub fn thumb_pressed(value: i16, stick: Stick, positive: bool, was_down: bool) -> bool {
    let threshold = match (stick, was_down) {
        (Stick::Left, false) => LEFT_THUMB_PRESS,
        (Stick::Left, true) => LEFT_THUMB_RELEASE,
        (Stick::Right, false) => RIGHT_THUMB_PRESS,
        (Stick::Right, true) => RIGHT_THUMB_RELEASE,
    };
    if positive {
        value > threshold
    } else {
        value < -threshold
    }
}

impl GamepadState {
    #[inline]
    fn thumb(&self, stick: Stick, axis: StickAxis) -> i16 {
        match (stick, axis) {
            (Stick::Left, StickAxis::X) => self.thumb_lx,
            (Stick::Left, StickAxis::Y) => self.thumb_ly,
            (Stick::Right, StickAxis::X) => self.thumb_rx,
            (Stick::Right, StickAxis::Y) => self.thumb_ry,
        }
    }

    /// Whether `code` reads as held, with hysteresis on the analog controls.
    /// Codes outside the gamepad layout are never held.
    pub fn is_pressed(&self, code: InputCode, was_down: bool) -> bool {
        match PadControl::for_code(code) {
            Some(PadControl::Button(mask)) => self.buttons & mask != 0,
            Some(PadControl::LeftTrigger) => trigger_pressed(self.left_trigger, was_down),
            Some(PadControl::RightTrigger) => trigger_pressed(self.right_trigger, was_down),
            Some(PadControl::Thumb {
                stick,
                axis,
                positive,
            }) => thumb_pressed(self.thumb(stick, axis), stick, positive, was_down),
            None => false,
        }
    }
}

/// Hides every control whose code is mapped, so the game only sees what
/// the mapping callbacks produce.
pub fn suppress_mapped(pad: &mut GamepadState, capabilities: &CapabilityTable) {
    for &(code, mask) in &BUTTON_MAP {
        if capabilities.is_mapped(code) {
            pad.buttons &= !mask;
        }
    }
    if capabilities.is_mapped(InputCode::PAD_LT) {
        pad.left_trigger = 0;
    }
    if capabilities.is_mapped(InputCode::PAD_RT) {
        pad.right_trigger = 0;
    }

    let either = |a, b| capabilities.is_mapped(a) || capabilities.is_mapped(b);
    if either(InputCode::PAD_LS_LEFT, InputCode::PAD_LS_RIGHT) {
        pad.thumb_lx = 0;
    }
    if either(InputCode::PAD_LS_UP, InputCode::PAD_LS_DOWN) {
        pad.thumb_ly = 0;
    }
    if either(InputCode::PAD_RS_LEFT, InputCode::PAD_RS_RIGHT) {
        pad.thumb_rx = 0;
    }
    if either(InputCode::PAD_RS_UP, InputCode::PAD_RS_DOWN) {
        pad.thumb_ry = 0;
    }
}

/// True if `file_name` (a bare name or a full path) names a known XInput
/// module.
pub fn is_xinput_module(file_name: &str) -> bool {
    let base = file_name
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(file_name);
    XINPUT_MODULES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(base))
}

/// Decides whether a by-name symbol lookup should be answered with the
/// gamepad trampoline.
pub fn should_redirect_proc(module_file_name: &str, proc_name: &str) -> bool {
    proc_name.eq_ignore_ascii_case("XInputGetState") && is_xinput_module(module_file_name)
}

/// The `XInputGetState` replacement.
pub struct GamepadEmulator {
    api: Arc<dyn GamepadApi>,
    capabilities: Arc<CapabilityTable>,
}

impl GamepadEmulator {
    pub fn new(api: Arc<dyn GamepadApi>, capabilities: Arc<CapabilityTable>) -> Self {
        Self { api, capabilities }
    }

    pub fn get_state(&self, user_index: u32, state: Option<&mut XInputState>) -> u32 {
        let Some(state) = state else {
            return ERROR_BAD_ARGUMENTS;
        };
        let result = self.api.get_state(user_index, state);
        if result == ERROR_SUCCESS {
            suppress_mapped(&mut state.gamepad, &self.capabilities);
        }
        result
    }
}
