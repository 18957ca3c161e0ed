//! C entry points for hosts that load the library into a process.

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::error;
use parking_lot::Mutex;

use crate::shim::{InstallOptions, Shim};

static SHIM: Mutex<Option<Shim>> = Mutex::new(None);

fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("{} panicked", name);
        fallback
    })
}

/// Installs the process-wide shim, creating it on first use. Returns
/// whether at least one interception point is active.
#[unsafe(no_mangle)]
pub extern "C" fn keyjack_install() -> bool {
    guarded("keyjack_install", false, || {
        let mut slot = SHIM.lock();
        let shim = slot.get_or_insert_with(|| {
            Shim::new(crate::platform::windows::platform(), InstallOptions::default())
        });
        let report = shim.install();
        if let Err(e) = shim.start() {
            error!("tick loop did not start: {}", e);
        }
        report.keyboard_hook || report.mouse_hook || report.joystick_armed
    })
}

/// Uninstalls and drops the process-wide shim. Safe to call repeatedly.
#[unsafe(no_mangle)]
pub extern "C" fn keyjack_uninstall() {
    guarded("keyjack_uninstall", (), || {
        if let Some(mut shim) = SHIM.lock().take() {
            shim.uninstall();
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn keyjack_is_installed() -> bool {
    guarded("keyjack_is_installed", false, || {
        SHIM.lock().as_ref().is_some_and(Shim::is_installed)
    })
}
