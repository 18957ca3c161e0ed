//! Win32 adapters.

mod devices;
mod hook;
mod iat;
mod sink;
mod trampolines;

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::core::{HSTRING, PCSTR};

pub use devices::{OsInput, WinmmJoystick, XInputLibrary, repeat_timing};
pub use sink::SendInputSink;

use crate::clock;
use crate::emulation::gamepad::XINPUT_MODULES;
use crate::emulation::{GamepadEmulator, JoystickEmulator};
use crate::hooks::HookRouter;
use crate::platform::pe::ImportTarget;
use crate::platform::{Interceptor, Platform};
use hook::{HookKind, HookThread};
use iat::PatchedSlot;

const WINMM: &[&str] = &["winmm.dll"];
const LIBRARY_LOADER: &[&str] = &[
    "kernel32.dll",
    "kernelbase.dll",
    "api-ms-win-core-libraryloader-l1-1-0.dll",
    "api-ms-win-core-libraryloader-l1-2-0.dll",
    "api-ms-win-core-libraryloader-l1-2-1.dll",
];

/// Bound address of `function` in an already-loaded `dll`.
fn loaded_export(dll: &str, function: &std::ffi::CStr) -> Option<u64> {
    let module = unsafe { GetModuleHandleW(&HSTRING::from(dll)) }.ok()?;
    unsafe { GetProcAddress(module, PCSTR(function.as_ptr().cast())) }.map(|f| f as usize as u64)
}

/// Low-level hooks on their own threads plus IAT patches.
#[derive(Default)]
pub struct WindowsInterceptor {
    hooks: Mutex<Vec<HookThread>>,
    patches: Mutex<Vec<PatchedSlot>>,
}

impl WindowsInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    fn install_hook(&self, kind: HookKind, router: HookRouter) -> bool {
        let mut hooks = self.hooks.lock();
        if hooks.iter().any(|h| h.kind() == kind) {
            return true;
        }
        hook::set_router(Some(router));
        match HookThread::spawn(kind) {
            Ok(thread) => {
                debug!("{:?} hook installed", kind);
                hooks.push(thread);
                true
            }
            Err(e) => {
                warn!("{:?} hook failed: {:#}", kind, e);
                false
            }
        }
    }
}

impl Interceptor for WindowsInterceptor {
    fn install_keyboard_hook(&self, router: HookRouter) -> bool {
        self.install_hook(HookKind::Keyboard, router)
    }

    fn install_mouse_hook(&self, router: HookRouter) -> bool {
        self.install_hook(HookKind::Mouse, router)
    }

    fn remove_hooks(&self) {
        let threads: Vec<_> = self.hooks.lock().drain(..).collect();
        for thread in threads {
            thread.stop();
        }
        hook::set_router(None);
    }

    fn install_joystick_emulation(&self, emulator: Arc<JoystickEmulator>) -> usize {
        trampolines::set_joystick(Some(emulator));
        let targets = [
            ImportTarget {
                dlls: WINMM,
                function: "joyGetNumDevs",
                real_address: loaded_export("winmm.dll", c"joyGetNumDevs"),
            },
            ImportTarget {
                dlls: WINMM,
                function: "joyGetPos",
                real_address: loaded_export("winmm.dll", c"joyGetPos"),
            },
            ImportTarget {
                dlls: WINMM,
                function: "joyGetPosEx",
                real_address: loaded_export("winmm.dll", c"joyGetPosEx"),
            },
            ImportTarget {
                dlls: WINMM,
                function: "joyGetDevCapsA",
                real_address: loaded_export("winmm.dll", c"joyGetDevCapsA"),
            },
            ImportTarget {
                dlls: WINMM,
                function: "joyGetDevCapsW",
                real_address: loaded_export("winmm.dll", c"joyGetDevCapsW"),
            },
        ];
        let replacements = [
            trampolines::joy_get_num_devs as *const () as usize,
            trampolines::joy_get_pos as *const () as usize,
            trampolines::joy_get_pos_ex as *const () as usize,
            trampolines::joy_get_dev_caps_a as *const () as usize,
            trampolines::joy_get_dev_caps_w as *const () as usize,
        ];

        let slots = iat::patch_loaded_modules(&targets, &replacements);
        let count = slots.len();
        self.patches.lock().extend(slots);
        info!("joystick emulation armed, {} slots", count);
        count
    }

    fn install_gamepad_emulation(&self, emulator: Arc<GamepadEmulator>) -> usize {
        trampolines::set_gamepad(Some(emulator));

        let real_gpa = loaded_export("kernel32.dll", c"GetProcAddress");
        if let Some(address) = real_gpa {
            trampolines::set_real_get_proc_address(address as usize);
        }

        let xinput_address = XINPUT_MODULES
            .iter()
            .find_map(|dll| loaded_export(dll, c"XInputGetState"));
        let mut targets = vec![ImportTarget {
            dlls: &XINPUT_MODULES,
            function: "XInputGetState",
            real_address: xinput_address,
        }];
        let mut replacements = vec![trampolines::xinput_get_state as *const () as usize];
        if real_gpa.is_some() {
            targets.push(ImportTarget {
                dlls: LIBRARY_LOADER,
                function: "GetProcAddress",
                real_address: real_gpa,
            });
            replacements.push(trampolines::get_proc_address as *const () as usize);
        } else {
            warn!("GetProcAddress not resolved, dynamic XInput lookups stay unpatched");
        }

        let slots = iat::patch_loaded_modules(&targets, &replacements);
        let count = slots.len();
        self.patches.lock().extend(slots);
        info!("gamepad emulation installed, {} slots", count);
        count
    }

    fn remove_emulation(&self) {
        let slots: Vec<_> = self.patches.lock().drain(..).collect();
        iat::restore(&slots);
        trampolines::set_joystick(None);
        debug!("restored {} import slots", slots.len());
    }
}

impl Drop for WindowsInterceptor {
    fn drop(&mut self) {
        self.remove_hooks();
        self.remove_emulation();
    }
}

/// The adapters for the running system.
pub fn platform() -> Platform {
    Platform {
        interceptor: Arc::new(WindowsInterceptor::new()),
        sink: Arc::new(SendInputSink),
        input: Arc::new(OsInput),
        joystick: Arc::new(WinmmJoystick::new()),
        gamepad: Arc::new(XInputLibrary::new()),
        clock: clock::monotonic(),
        repeat_timing: repeat_timing(),
    }
}
