//! Real device entry points, resolved at runtime so the shim always calls
//! the unpatched functions.

use std::ffi::{CStr, c_void};
use std::mem::size_of;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::RwLock;
use windows::Win32::Foundation::{FreeLibrary, HMODULE, POINT};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
use windows::Win32::UI::WindowsAndMessaging::{
    GetCursorPos, SPI_GETKEYBOARDDELAY, SPI_GETKEYBOARDSPEED, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS,
    SystemParametersInfoW,
};
use windows::core::{HSTRING, PCSTR};

use crate::emulation::gamepad::{ERROR_DEVICE_NOT_CONNECTED, XINPUT_MODULES};
use crate::emulation::joystick::JOYERR_UNPLUGGED;
use crate::emulation::{
    GamepadApi, JoyCapsA, JoyCapsW, JoyInfo, JoyInfoEx, JoystickApi, XInputState,
};
use crate::engine::InputSource;
use crate::inject::{MouseButton, RepeatTiming};

type JoyGetNumDevsFn = unsafe extern "system" fn() -> u32;
type JoyGetPosFn = unsafe extern "system" fn(u32, *mut JoyInfo) -> u32;
type JoyGetPosExFn = unsafe extern "system" fn(u32, *mut JoyInfoEx) -> u32;
type JoyGetDevCapsAFn = unsafe extern "system" fn(usize, *mut JoyCapsA, u32) -> u32;
type JoyGetDevCapsWFn = unsafe extern "system" fn(usize, *mut JoyCapsW, u32) -> u32;
type XInputGetStateFn = unsafe extern "system" fn(u32, *mut XInputState) -> u32;

/// A `LoadLibraryW` reference, freed on drop.
struct Library {
    name: &'static str,
    handle: usize,
}

impl Library {
    fn load(name: &'static str) -> Option<Self> {
        let module = unsafe { LoadLibraryW(&HSTRING::from(name)) }.ok()?;
        trace!("loaded {}", name);
        Some(Self {
            name,
            handle: module.0 as usize,
        })
    }

    fn symbol(&self, name: &CStr) -> Option<usize> {
        let module = HMODULE(self.handle as *mut c_void);
        unsafe { GetProcAddress(module, PCSTR(name.as_ptr().cast())) }.map(|f| f as usize)
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        // Unload failures are ignored
        let _ = unsafe { FreeLibrary(HMODULE(self.handle as *mut c_void)) };
        trace!("released {}", self.name);
    }
}

struct WinmmFns {
    _library: Library,
    num_devs: Option<JoyGetNumDevsFn>,
    get_pos: Option<JoyGetPosFn>,
    get_pos_ex: Option<JoyGetPosExFn>,
    get_dev_caps_a: Option<JoyGetDevCapsAFn>,
    get_dev_caps_w: Option<JoyGetDevCapsWFn>,
}

impl WinmmFns {
    fn load() -> Option<Self> {
        let library = Library::load("winmm.dll")?;
        unsafe {
            Some(Self {
                num_devs: library
                    .symbol(c"joyGetNumDevs")
                    .map(|p| std::mem::transmute::<usize, JoyGetNumDevsFn>(p)),
                get_pos: library
                    .symbol(c"joyGetPos")
                    .map(|p| std::mem::transmute::<usize, JoyGetPosFn>(p)),
                get_pos_ex: library
                    .symbol(c"joyGetPosEx")
                    .map(|p| std::mem::transmute::<usize, JoyGetPosExFn>(p)),
                get_dev_caps_a: library
                    .symbol(c"joyGetDevCapsA")
                    .map(|p| std::mem::transmute::<usize, JoyGetDevCapsAFn>(p)),
                get_dev_caps_w: library
                    .symbol(c"joyGetDevCapsW")
                    .map(|p| std::mem::transmute::<usize, JoyGetDevCapsWFn>(p)),
                _library: library,
            })
        }
    }
}

/// WinMM joystick functions, loaded on first use.
#[derive(Default)]
pub struct WinmmJoystick {
    fns: RwLock<Option<Arc<WinmmFns>>>,
}

impl WinmmJoystick {
    pub fn new() -> Self {
        Self::default()
    }

    fn fns(&self) -> Option<Arc<WinmmFns>> {
        if let Some(fns) = self.fns.read().as_ref() {
            return Some(fns.clone());
        }
        let mut slot = self.fns.write();
        if slot.is_none() {
            *slot = WinmmFns::load().map(Arc::new);
        }
        slot.clone()
    }
}

impl JoystickApi for WinmmJoystick {
    fn num_devs(&self) -> u32 {
        match self.fns().and_then(|fns| fns.num_devs) {
            Some(f) => unsafe { f() },
            None => 0,
        }
    }

    fn get_pos(&self, id: u32, info: &mut JoyInfo) -> u32 {
        match self.fns().and_then(|fns| fns.get_pos) {
            Some(f) => unsafe { f(id, info) },
            None => JOYERR_UNPLUGGED,
        }
    }

    fn get_pos_ex(&self, id: u32, info: &mut JoyInfoEx) -> u32 {
        match self.fns().and_then(|fns| fns.get_pos_ex) {
            Some(f) => unsafe { f(id, info) },
            None => JOYERR_UNPLUGGED,
        }
    }

    fn get_dev_caps_a(&self, id: usize, caps: &mut JoyCapsA) -> u32 {
        match self.fns().and_then(|fns| fns.get_dev_caps_a) {
            Some(f) => unsafe { f(id, caps, size_of::<JoyCapsA>() as u32) },
            None => JOYERR_UNPLUGGED,
        }
    }

    fn get_dev_caps_w(&self, id: usize, caps: &mut JoyCapsW) -> u32 {
        match self.fns().and_then(|fns| fns.get_dev_caps_w) {
            Some(f) => unsafe { f(id, caps, size_of::<JoyCapsW>() as u32) },
            None => JOYERR_UNPLUGGED,
        }
    }

    fn release(&self) {
        self.fns.write().take();
    }
}

struct XInputFns {
    _library: Library,
    get_state: XInputGetStateFn,
}

impl XInputFns {
    /// First XInput DLL that loads and exports `XInputGetState`.
    fn load() -> Option<Self> {
        XINPUT_MODULES.iter().find_map(|&name| {
            let library = Library::load(name)?;
            let address = library.symbol(c"XInputGetState")?;
            debug!("using {} for XInputGetState", name);
            Some(Self {
                get_state: unsafe { std::mem::transmute::<usize, XInputGetStateFn>(address) },
                _library: library,
            })
        })
    }
}

/// `XInputGetState` from the first XInput DLL that loads.
#[derive(Default)]
pub struct XInputLibrary {
    fns: RwLock<Option<Arc<XInputFns>>>,
}

impl XInputLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn fns(&self) -> Option<Arc<XInputFns>> {
        if let Some(fns) = self.fns.read().as_ref() {
            return Some(fns.clone());
        }
        let mut slot = self.fns.write();
        if slot.is_none() {
            *slot = XInputFns::load().map(Arc::new);
        }
        slot.clone()
    }
}

impl GamepadApi for XInputLibrary {
    fn get_state(&self, user_index: u32, state: &mut XInputState) -> u32 {
        match self.fns() {
            Some(fns) => unsafe { (fns.get_state)(user_index, state) },
            None => ERROR_DEVICE_NOT_CONNECTED,
        }
    }

    fn release(&self) {
        self.fns.write().take();
    }
}

/// Async key state and cursor position.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsInput;

const VK_LBUTTON: u16 = 0x01;
const VK_RBUTTON: u16 = 0x02;
const VK_MBUTTON: u16 = 0x04;
const VK_XBUTTON1: u16 = 0x05;
const VK_XBUTTON2: u16 = 0x06;

impl InputSource for OsInput {
    #[inline]
    fn key_down(&self, vk: u16) -> bool {
        (unsafe { GetAsyncKeyState(vk as i32) } as u16) & 0x8000 != 0
    }

    fn mouse_button_down(&self, button: MouseButton) -> bool {
        let vk = match button {
            MouseButton::Left => VK_LBUTTON,
            MouseButton::Right => VK_RBUTTON,
            MouseButton::Middle => VK_MBUTTON,
            MouseButton::X1 => VK_XBUTTON1,
            MouseButton::X2 => VK_XBUTTON2,
        };
        self.key_down(vk)
    }

    fn cursor_pos(&self) -> Option<(i32, i32)> {
        let mut point = POINT::default();
        unsafe { GetCursorPos(&mut point) }.ok()?;
        Some((point.x, point.y))
    }
}

/// Auto-repeat timing from the user's keyboard settings.
pub fn repeat_timing() -> RepeatTiming {
    let read = |action| {
        let mut value: u32 = 0;
        unsafe {
            SystemParametersInfoW(
                action,
                0,
                Some(&mut value as *mut u32 as *mut c_void),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
        }
        .ok()
        .map(|_| value)
    };

    match (read(SPI_GETKEYBOARDDELAY), read(SPI_GETKEYBOARDSPEED)) {
        (Some(delay), Some(speed)) => RepeatTiming::from_settings(delay, speed),
        _ => RepeatTiming::default(),
    }
}
