//! Input remapping shim.
//!
//! Physical keyboard, mouse and gamepad input is routed into a polling
//! mapping engine that drives synthetic input and a virtual joystick.
//! Legacy joystick and XInput queries made by the host process are answered
//! from the virtual joystick and with mapped controls hidden.
//!
//! [`Shim`] owns every component. OS access goes through
//! [`platform::Platform`], which has a Win32 implementation and an
//! in-memory one for tests.

pub mod actions;
pub mod backoff;
pub mod capability;
pub mod clock;
pub mod code;
pub mod config;
pub mod emulation;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod inject;
pub mod logging;
pub mod platform;
pub mod ramp;
pub mod shim;
pub mod tick;
pub mod vjoy;

#[cfg(windows)]
pub mod ffi;
#[cfg(windows)]
pub mod signal;

pub use capability::{CapabilityTable, OverrideTable};
pub use code::{InputClass, InputCode};
pub use config::{BindingAction, BindingConfig, ShimConfig};
pub use engine::{Binding, ControlMapper, InputSource};
pub use error::ShimError;
pub use inject::{INJECTION_TAG, Injector, MouseButton, RepeatTiming};
pub use ramp::{MovementRamp, RampSettings};
pub use shim::{InstallOptions, InstallReport, Shim};
pub use vjoy::{Axis, VirtualJoystick};
