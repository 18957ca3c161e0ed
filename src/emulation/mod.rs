//! Replacement implementations of the legacy joystick and XInput query
//! functions. The OS adapter routes the patched imports here.

pub mod gamepad;
pub mod joystick;

pub use gamepad::{GamepadApi, GamepadEmulator, GamepadState, XInputState};
pub use joystick::{JoyCapsA, JoyCapsW, JoyInfo, JoyInfoEx, JoystickApi, JoystickEmulator};
