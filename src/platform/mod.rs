//! Everything the shim needs from the operating system, behind traits.
//!
//! `windows` provides the real adapters; `fake` provides in-memory ones used
//! by the tests and by builds on other hosts.

pub mod fake;
pub mod pe;
#[cfg(windows)]
pub mod windows;

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::emulation::{GamepadApi, GamepadEmulator, JoystickApi, JoystickEmulator};
use crate::engine::InputSource;
use crate::hooks::HookRouter;
use crate::inject::{InputSink, RepeatTiming};

/// Installs and removes the process-wide interception points.
///
/// Install methods report failure instead of erroring; the shim keeps
/// running without whatever could not be installed.
pub trait Interceptor: Send + Sync {
    fn install_keyboard_hook(&self, router: HookRouter) -> bool;
    fn install_mouse_hook(&self, router: HookRouter) -> bool;
    /// Removes both hooks and waits for their threads.
    fn remove_hooks(&self);

    /// Redirects joystick imports to `emulator`. Returns the number of
    /// import slots patched.
    fn install_joystick_emulation(&self, emulator: Arc<JoystickEmulator>) -> usize;
    /// Redirects XInput imports and `GetProcAddress` lookups to `emulator`.
    fn install_gamepad_emulation(&self, emulator: Arc<GamepadEmulator>) -> usize;
    /// Restores every patched slot.
    fn remove_emulation(&self);
}

/// The set of adapters a [`crate::Shim`] is built from.
#[derive(Clone)]
pub struct Platform {
    pub interceptor: Arc<dyn Interceptor>,
    pub sink: Arc<dyn InputSink>,
    pub input: Arc<dyn InputSource>,
    pub joystick: Arc<dyn JoystickApi>,
    pub gamepad: Arc<dyn GamepadApi>,
    pub clock: SharedClock,
    pub repeat_timing: RepeatTiming,
}
