//! `extern "system"` replacements written into patched import slots.
//!
//! Patched code has no way to carry context, so each trampoline reads the
//! emulator it forwards to from a static.

use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::GetModuleFileNameW;

use crate::emulation::gamepad::{ERROR_DEVICE_NOT_CONNECTED, should_redirect_proc};
use crate::emulation::joystick::JOYERR_UNPLUGGED;
use crate::emulation::{
    GamepadEmulator, JoyCapsA, JoyCapsW, JoyInfo, JoyInfoEx, JoystickEmulator, XInputState,
};

static JOYSTICK: RwLock<Option<Arc<JoystickEmulator>>> = RwLock::new(None);
static GAMEPAD: RwLock<Option<Arc<GamepadEmulator>>> = RwLock::new(None);
static REAL_GET_PROC_ADDRESS: AtomicUsize = AtomicUsize::new(0);

type GetProcAddressFn = unsafe extern "system" fn(*mut c_void, *const u8) -> usize;

pub fn set_joystick(emulator: Option<Arc<JoystickEmulator>>) {
    *JOYSTICK.write() = emulator;
}

pub fn set_gamepad(emulator: Option<Arc<GamepadEmulator>>) {
    *GAMEPAD.write() = emulator;
}

pub fn set_real_get_proc_address(address: usize) {
    REAL_GET_PROC_ADDRESS.store(address, Ordering::Release);
}

fn joystick() -> Option<Arc<JoystickEmulator>> {
    JOYSTICK.read().clone()
}

pub unsafe extern "system" fn joy_get_num_devs() -> u32 {
    joystick().map_or(0, |joy| joy.num_devs())
}

pub unsafe extern "system" fn joy_get_pos(id: u32, info: *mut JoyInfo) -> u32 {
    match joystick() {
        Some(joy) => joy.get_pos(id, unsafe { info.as_mut() }),
        None => JOYERR_UNPLUGGED,
    }
}

pub unsafe extern "system" fn joy_get_pos_ex(id: u32, info: *mut JoyInfoEx) -> u32 {
    match joystick() {
        Some(joy) => joy.get_pos_ex(id, unsafe { info.as_mut() }),
        None => JOYERR_UNPLUGGED,
    }
}

pub unsafe extern "system" fn joy_get_dev_caps_a(id: usize, caps: *mut JoyCapsA, size: u32) -> u32 {
    match joystick() {
        Some(joy) => joy.get_dev_caps_a(id, unsafe { caps.as_mut() }, size),
        None => JOYERR_UNPLUGGED,
    }
}

pub unsafe extern "system" fn joy_get_dev_caps_w(id: usize, caps: *mut JoyCapsW, size: u32) -> u32 {
    match joystick() {
        Some(joy) => joy.get_dev_caps_w(id, unsafe { caps.as_mut() }, size),
        None => JOYERR_UNPLUGGED,
    }
}

pub unsafe extern "system" fn xinput_get_state(user_index: u32, state: *mut XInputState) -> u32 {
    // Callers may cache this pointer past uninstall, so the emulator stays
    // set; with nothing mapped it passes the real state through.
    match GAMEPAD.read().clone() {
        Some(pad) => pad.get_state(user_index, unsafe { state.as_mut() }),
        None => ERROR_DEVICE_NOT_CONNECTED,
    }
}

fn module_file_name(module: *mut c_void) -> Option<String> {
    let mut buf = [0u16; 260];
    let len = unsafe { GetModuleFileNameW(Some(HMODULE(module)), &mut buf) } as usize;
    (len > 0).then(|| String::from_utf16_lossy(&buf[..len.min(buf.len())]))
}

pub unsafe extern "system" fn get_proc_address(module: *mut c_void, name: *const u8) -> usize {
    // Values up to 0xFFFF are ordinals, not string pointers.
    if name as usize > 0xFFFF && GAMEPAD.read().is_some() {
        let proc_name = unsafe { std::ffi::CStr::from_ptr(name.cast()) }.to_string_lossy();
        if let Some(file) = module_file_name(module)
            && should_redirect_proc(&file, &proc_name)
        {
            return xinput_get_state as *const () as usize;
        }
    }

    let real = REAL_GET_PROC_ADDRESS.load(Ordering::Acquire);
    if real == 0 {
        return 0;
    }
    let real: GetProcAddressFn = unsafe { std::mem::transmute::<usize, GetProcAddressFn>(real) };
    unsafe { real(module, name) }
}
