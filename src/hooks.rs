//! Classification of low-level keyboard and mouse hook events.
//!
//! The OS hook procedures copy the fields they need into [`KeyEvent`] /
//! [`MouseEvent`] and ask the [`HookRouter`] what to do. Everything here is
//! plain data so it can be driven without a real hook.

use std::sync::Arc;

use log::trace;

use crate::capability::{CapabilityTable, OverrideTable};
use crate::code::InputCode;
use crate::inject::INJECTION_TAG;

pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;

pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_XBUTTONDOWN: u32 = 0x020B;
pub const WM_XBUTTONUP: u32 = 0x020C;

/// `LLKHF_INJECTED`
pub const KEY_INJECTED_FLAG: u32 = 0x10;
/// `LLMHF_INJECTED`
pub const MOUSE_INJECTED_FLAG: u32 = 0x01;

const XBUTTON1: u32 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub message: u32,
    pub vk_code: u32,
    pub flags: u32,
    pub extra_info: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub message: u32,
    pub mouse_data: u32,
    pub flags: u32,
    pub extra_info: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    PassThrough,
    Swallow { code: InputCode, down: bool },
}

impl HookDecision {
    #[inline]
    pub fn swallows(self) -> bool {
        matches!(self, HookDecision::Swallow { .. })
    }
}

impl KeyEvent {
    #[inline]
    fn is_synthetic(&self) -> bool {
        self.extra_info == INJECTION_TAG || self.flags & KEY_INJECTED_FLAG != 0
    }

    /// The code and transition this event represents, if any.
    pub fn classify(&self) -> Option<(InputCode, bool)> {
        let down = match self.message {
            WM_KEYDOWN | WM_SYSKEYDOWN => true,
            WM_KEYUP | WM_SYSKEYUP => false,
            _ => return None,
        };
        let vk = u16::try_from(self.vk_code).ok()?;
        let code = InputCode::key(vk);
        code.is_keyboard().then_some((code, down))
    }
}

impl MouseEvent {
    #[inline]
    fn is_synthetic(&self) -> bool {
        self.extra_info == INJECTION_TAG || self.flags & MOUSE_INJECTED_FLAG != 0
    }

    /// Button transitions only. Movement and wheel are never classified.
    pub fn classify(&self) -> Option<(InputCode, bool)> {
        let x_button = || {
            if self.mouse_data >> 16 == XBUTTON1 {
                InputCode::MOUSE_X1
            } else {
                InputCode::MOUSE_X2
            }
        };
        match self.message {
            WM_LBUTTONDOWN => Some((InputCode::MOUSE_LEFT, true)),
            WM_LBUTTONUP => Some((InputCode::MOUSE_LEFT, false)),
            WM_MBUTTONDOWN => Some((InputCode::MOUSE_MIDDLE, true)),
            WM_MBUTTONUP => Some((InputCode::MOUSE_MIDDLE, false)),
            WM_RBUTTONDOWN => Some((InputCode::MOUSE_RIGHT, true)),
            WM_RBUTTONUP => Some((InputCode::MOUSE_RIGHT, false)),
            WM_XBUTTONDOWN => Some((x_button(), true)),
            WM_XBUTTONUP => Some((x_button(), false)),
            _ => None,
        }
    }
}

/// Decides, per event, whether to swallow it and records the physical
/// state of swallowed codes as an override for the next tick.
#[derive(Clone)]
pub struct HookRouter {
    capabilities: Arc<CapabilityTable>,
    overrides: Arc<OverrideTable>,
}

impl HookRouter {
    pub fn new(capabilities: Arc<CapabilityTable>, overrides: Arc<OverrideTable>) -> Self {
        Self {
            capabilities,
            overrides,
        }
    }

    pub fn on_key(&self, event: &KeyEvent) -> HookDecision {
        if event.is_synthetic() {
            return HookDecision::PassThrough;
        }
        self.route(event.classify())
    }

    pub fn on_mouse(&self, event: &MouseEvent) -> HookDecision {
        if event.is_synthetic() {
            return HookDecision::PassThrough;
        }
        self.route(event.classify())
    }

    #[inline]
    fn route(&self, classified: Option<(InputCode, bool)>) -> HookDecision {
        match classified {
            Some((code, down)) if self.capabilities.is_mapped(code) => {
                self.overrides.set(code, down);
                trace!("swallowed {} down={}", code, down);
                HookDecision::Swallow { code, down }
            }
            _ => HookDecision::PassThrough,
        }
    }
}
