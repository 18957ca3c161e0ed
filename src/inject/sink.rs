//! Synthetic input events and the trait that delivers them to the OS.

use crate::code::InputCode;

/// `dwExtraInfo` stamped on every event this crate synthesizes. The hooks
/// pass anything carrying it straight through.
pub const INJECTION_TAG: usize = 0x4B4A_5744;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl MouseButton {
    pub fn from_code(code: InputCode) -> Option<Self> {
        match code {
            InputCode::MOUSE_LEFT => Some(Self::Left),
            InputCode::MOUSE_MIDDLE => Some(Self::Middle),
            InputCode::MOUSE_RIGHT => Some(Self::Right),
            InputCode::MOUSE_X1 => Some(Self::X1),
            InputCode::MOUSE_X2 => Some(Self::X2),
            _ => None,
        }
    }

    /// Index used by the button injection entry point: 0 left, 1 right,
    /// 2 middle.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            2 => Some(Self::Middle),
            3 => Some(Self::X1),
            4 => Some(Self::X2),
            _ => None,
        }
    }

    pub fn code(self) -> InputCode {
        match self {
            Self::Left => InputCode::MOUSE_LEFT,
            Self::Right => InputCode::MOUSE_RIGHT,
            Self::Middle => InputCode::MOUSE_MIDDLE,
            Self::X1 => InputCode::MOUSE_X1,
            Self::X2 => InputCode::MOUSE_X2,
        }
    }
}

/// How a key event identifies its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyForm {
    /// Hardware scan code looked up from the virtual key.
    ScanCode,
    VirtualKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticInput {
    Key {
        vk: u16,
        down: bool,
        form: KeyForm,
    },
    MouseButton {
        button: MouseButton,
        down: bool,
    },
    /// Relative move in pixels, or with `absolute` a position in pixels on
    /// the primary screen.
    MouseMove {
        dx: i32,
        dy: i32,
        absolute: bool,
    },
}

impl SyntheticInput {
    #[inline]
    pub const fn scan_key(vk: u16, down: bool) -> Self {
        Self::Key {
            vk,
            down,
            form: KeyForm::ScanCode,
        }
    }

    #[inline]
    pub const fn vk_key(vk: u16, down: bool) -> Self {
        Self::Key {
            vk,
            down,
            form: KeyForm::VirtualKey,
        }
    }
}

/// Delivers tagged synthetic input.
pub trait InputSink: Send + Sync {
    /// Sends the events in order. Delivery failures are dropped.
    fn send(&self, inputs: &[SyntheticInput]);
}

/// Scales a pixel position to the 0..=65535 absolute mouse space.
#[inline]
pub fn normalize_absolute(pos: i32, extent: i32) -> i32 {
    if extent <= 0 {
        return 0;
    }
    ((pos as i64 * 65535) / extent as i64) as i32
}
