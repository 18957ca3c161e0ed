use std::mem::size_of;

use log::trace;
use smallvec::SmallVec;
use windows::Win32::UI::Input::KeyboardAndMouse::*;
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use crate::inject::{INJECTION_TAG, InputSink, KeyForm, MouseButton, SyntheticInput, normalize_absolute};

const XBUTTON1: u32 = 0x0001;
const XBUTTON2: u32 = 0x0002;

/// Delivers synthetic input through `SendInput`, tagged with
/// [`INJECTION_TAG`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SendInputSink;

impl InputSink for SendInputSink {
    fn send(&self, inputs: &[SyntheticInput]) {
        let batch: SmallVec<[INPUT; 8]> = inputs.iter().map(to_input).collect();
        if batch.is_empty() {
            return;
        }
        let sent = unsafe { SendInput(&batch, size_of::<INPUT>() as i32) };
        if sent as usize != batch.len() {
            trace!("SendInput accepted {} of {} events", sent, batch.len());
        }
    }
}

// Keys whose scan code needs the E0 prefix.
fn is_extended(vk: u16) -> bool {
    matches!(
        vk,
        0x21..=0x28 // page up/down, end, home, arrows
            | 0x2D | 0x2E // insert, delete
            | 0x5B | 0x5C | 0x5D // windows keys, apps
            | 0x6F // keypad divide
            | 0x90 // num lock
            | 0xA3 | 0xA5 // right ctrl, right alt
    )
}

fn key_input(vk: u16, down: bool, form: KeyForm) -> INPUT {
    let up_flag = if down {
        KEYBD_EVENT_FLAGS(0)
    } else {
        KEYEVENTF_KEYUP
    };
    let (w_vk, w_scan, flags) = match form {
        KeyForm::ScanCode => {
            let scan = unsafe { MapVirtualKeyW(vk as u32, MAPVK_VK_TO_VSC) } as u16;
            let mut flags = KEYEVENTF_SCANCODE | up_flag;
            if is_extended(vk) {
                flags |= KEYEVENTF_EXTENDEDKEY;
            }
            (VIRTUAL_KEY(0), scan, flags)
        }
        KeyForm::VirtualKey => (VIRTUAL_KEY(vk), 0, up_flag),
    };

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: w_vk,
                wScan: w_scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: INJECTION_TAG,
            },
        },
    }
}

fn mouse_input(dx: i32, dy: i32, mouse_data: u32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: mouse_data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: INJECTION_TAG,
            },
        },
    }
}

fn to_input(input: &SyntheticInput) -> INPUT {
    match *input {
        SyntheticInput::Key { vk, down, form } => key_input(vk, down, form),
        SyntheticInput::MouseButton { button, down } => {
            let (down_flag, up_flag) = match button {
                MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
                MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
                MouseButton::Middle => (MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP),
                MouseButton::X1 | MouseButton::X2 => (MOUSEEVENTF_XDOWN, MOUSEEVENTF_XUP),
            };
            let mouse_data = match button {
                MouseButton::X1 => XBUTTON1,
                MouseButton::X2 => XBUTTON2,
                _ => 0,
            };
            mouse_input(0, 0, mouse_data, if down { down_flag } else { up_flag })
        }
        SyntheticInput::MouseMove {
            dx,
            dy,
            absolute: false,
        } => mouse_input(dx, dy, 0, MOUSEEVENTF_MOVE),
        SyntheticInput::MouseMove {
            dx,
            dy,
            absolute: true,
        } => {
            let (width, height) =
                unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
            mouse_input(
                normalize_absolute(dx, width),
                normalize_absolute(dy, height),
                0,
                MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE,
            )
        }
    }
}
