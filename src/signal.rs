use std::sync::atomic::{AtomicBool, Ordering};

use windows::Win32::System::Console::*;
use windows::core::*;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn set_control_ctrl_handler() -> Result<()> {
    unsafe { SetConsoleCtrlHandler(Some(console_handler), true) }
}

/// True once Ctrl+C, Ctrl+Break or a console close has been received.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Acquire)
}

#[allow(non_snake_case)]
unsafe extern "system" fn console_handler(ctrl_type: u32) -> BOOL {
    match ctrl_type {
        CTRL_C_EVENT | CTRL_BREAK_EVENT | CTRL_CLOSE_EVENT => {
            // A second request means the graceful path is stuck
            if SHUTDOWN_REQUESTED.swap(true, Ordering::AcqRel) {
                std::process::exit(1);
            }
            BOOL(1) // Event has been handled
        }
        _ => BOOL(0), // Leave other events to the default handler
    }
}
