//! Logical input codes shared by the hooks, the mapping engine and the
//! emulation layer.
//!
//! One signed integer space covers every physical input:
//! `1..=255` are keyboard virtual keys, `-1..=-5` are mouse buttons,
//! `-8` is mouse movement and `-99..=-10` is the gamepad class.

use std::fmt;
use std::str::FromStr;

use crate::error::ShimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputCode(pub i32);

/// Broad device class of an [`InputCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    Keyboard,
    MouseButton,
    MouseMove,
    Gamepad,
    Unknown,
}

impl InputCode {
    pub const NONE: Self = Self(0);

    pub const MOUSE_LEFT: Self = Self(-1);
    pub const MOUSE_MIDDLE: Self = Self(-2);
    pub const MOUSE_RIGHT: Self = Self(-3);
    pub const MOUSE_X1: Self = Self(-4);
    pub const MOUSE_X2: Self = Self(-5);
    pub const MOUSE_MOVE: Self = Self(-8);

    pub const PAD_A: Self = Self(-10);
    pub const PAD_B: Self = Self(-11);
    pub const PAD_X: Self = Self(-12);
    pub const PAD_Y: Self = Self(-13);
    pub const PAD_LB: Self = Self(-14);
    pub const PAD_RB: Self = Self(-15);
    pub const PAD_LS_CLICK: Self = Self(-16);
    pub const PAD_RS_CLICK: Self = Self(-17);
    pub const PAD_BACK: Self = Self(-18);
    pub const PAD_START: Self = Self(-19);
    pub const PAD_DPAD_UP: Self = Self(-20);
    pub const PAD_DPAD_DOWN: Self = Self(-21);
    pub const PAD_DPAD_LEFT: Self = Self(-22);
    pub const PAD_DPAD_RIGHT: Self = Self(-23);
    pub const PAD_LT: Self = Self(-24);
    pub const PAD_RT: Self = Self(-25);
    pub const PAD_LS_UP: Self = Self(-26);
    pub const PAD_LS_DOWN: Self = Self(-27);
    pub const PAD_LS_LEFT: Self = Self(-28);
    pub const PAD_LS_RIGHT: Self = Self(-29);
    pub const PAD_RS_UP: Self = Self(-30);
    pub const PAD_RS_DOWN: Self = Self(-31);
    pub const PAD_RS_LEFT: Self = Self(-32);
    pub const PAD_RS_RIGHT: Self = Self(-33);

    /// Mouse button codes in hook order (left, middle, right, X1, X2).
    pub const MOUSE_BUTTONS: [Self; 5] = [
        Self::MOUSE_LEFT,
        Self::MOUSE_MIDDLE,
        Self::MOUSE_RIGHT,
        Self::MOUSE_X1,
        Self::MOUSE_X2,
    ];

    /// Keyboard code for a virtual key.
    #[inline]
    pub const fn key(vk: u16) -> Self {
        Self(vk as i32)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn class(self) -> InputClass {
        match self.0 {
            1..=255 => InputClass::Keyboard,
            -5..=-1 => InputClass::MouseButton,
            -8 => InputClass::MouseMove,
            -99..=-10 => InputClass::Gamepad,
            _ => InputClass::Unknown,
        }
    }

    #[inline]
    pub const fn is_keyboard(self) -> bool {
        matches!(self.0, 1..=255)
    }

    #[inline]
    pub const fn is_mouse_button(self) -> bool {
        matches!(self.0, -5..=-1)
    }

    #[inline]
    pub const fn is_gamepad(self) -> bool {
        matches!(self.0, -99..=-10)
    }

    /// Virtual key for keyboard codes that fit the OS key range.
    #[inline]
    pub fn virtual_key(self) -> Option<u16> {
        match self.0 {
            1..=255 => Some(self.0 as u16),
            _ => None,
        }
    }

    /// Parses a binding name such as `"space"`, `"f5"`, `"mouse_x1"` or
    /// `"XboxLSUp"`. Matching ignores case.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return None;
        }

        let bytes = lower.as_bytes();
        if bytes.len() == 1 {
            let c = bytes[0];
            if c.is_ascii_lowercase() {
                return Some(Self::key(c.to_ascii_uppercase() as u16));
            }
            if c.is_ascii_digit() {
                return Some(Self::key(c as u16));
            }
        }

        let function_key = lower
            .strip_prefix('f')
            .and_then(|n| n.parse::<u16>().ok())
            .filter(|n| (1..=24).contains(n));
        if let Some(n) = function_key {
            return Some(Self::key(0x70 + n - 1));
        }

        let keypad_digit = lower
            .strip_prefix("kp_")
            .and_then(|n| n.parse::<u16>().ok())
            .filter(|&n| n <= 9);
        if let Some(n) = keypad_digit {
            return Some(Self::key(0x60 + n));
        }

        NAMED_CODES
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(&lower))
            .map(|&(_, code)| Self(code))
    }

    /// Canonical binding name, the inverse of [`InputCode::from_name`] for
    /// every code it can produce.
    pub fn name(self) -> String {
        match self.0 {
            0x41..=0x5A => ((self.0 as u8) as char).to_ascii_lowercase().to_string(),
            0x30..=0x39 => ((self.0 as u8) as char).to_string(),
            0x60..=0x69 => format!("kp_{}", self.0 - 0x60),
            0x70..=0x87 => format!("f{}", self.0 - 0x70 + 1),
            raw => NAMED_CODES
                .iter()
                .find(|&&(_, code)| code == raw)
                .map(|&(name, _)| name.to_string())
                .unwrap_or_else(|| {
                    if raw > 0 {
                        format!("vk_{:#04x}", raw)
                    } else {
                        format!("code_{}", raw)
                    }
                }),
        }
    }
}

impl fmt::Display for InputCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for InputCode {
    type Err = ShimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ShimError::UnknownInput(s.to_string()))
    }
}

impl From<i32> for InputCode {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

// Names that are not covered by the letter, digit, function-key and keypad
// digit rules. First entry wins when a code has two names.
const NAMED_CODES: &[(&str, i32)] = &[
    ("esc", 0x1B),
    ("space", 0x20),
    ("enter", 0x0D),
    ("tab", 0x09),
    ("backspace", 0x08),
    ("shift", 0xA0),
    ("rshift", 0xA1),
    ("ctrl", 0xA2),
    ("rctrl", 0xA3),
    ("alt", 0xA4),
    ("ralt", 0xA5),
    ("capslock", 0x14),
    ("insert", 0x2D),
    ("delete", 0x2E),
    ("home", 0x24),
    ("end", 0x23),
    ("pageup", 0x21),
    ("pagedown", 0x22),
    ("up", 0x26),
    ("down", 0x28),
    ("left", 0x25),
    ("right", 0x27),
    ("printscreen", 0x2C),
    ("scrolllock", 0x91),
    ("pause", 0x13),
    ("numlock", 0x90),
    ("kp_divide", 0x6F),
    ("kp_multiply", 0x6A),
    ("kp_minus", 0x6D),
    ("kp_plus", 0x6B),
    ("kp_period", 0x6E),
    ("kp_enter", 0x0D),
    ("comma", 0xBC),
    ("period", 0xBE),
    ("slash", 0xBF),
    ("minus", 0xBD),
    ("equals", 0xBB),
    ("semicolon", 0xBA),
    ("quote", 0xDE),
    ("backquote", 0xC0),
    ("lbracket", 0xDB),
    ("rbracket", 0xDD),
    ("backslash", 0xDC),
    ("mouse_left", -1),
    ("mouse_middle", -2),
    ("mouse_right", -3),
    ("mouse_x1", -4),
    ("mouse_x2", -5),
    ("mouse_move", -8),
    ("XboxA", -10),
    ("XboxB", -11),
    ("XboxX", -12),
    ("XboxY", -13),
    ("XboxLB", -14),
    ("XboxRB", -15),
    ("XboxLSClick", -16),
    ("XboxRSClick", -17),
    ("XboxBack", -18),
    ("XboxStart", -19),
    ("XboxDPadUp", -20),
    ("XboxDPadDown", -21),
    ("XboxDPadLeft", -22),
    ("XboxDPadRight", -23),
    ("XboxLT", -24),
    ("XboxRT", -25),
    ("XboxLSUp", -26),
    ("XboxLSDown", -27),
    ("XboxLSLeft", -28),
    ("XboxLSRight", -29),
    ("XboxRSUp", -30),
    ("XboxRSDown", -31),
    ("XboxRSLeft", -32),
    ("XboxRSRight", -33),
];
