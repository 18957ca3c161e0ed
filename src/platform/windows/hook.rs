use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use parking_lot::RwLock;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::hooks::{HookDecision, HookRouter, KeyEvent, MouseEvent};

// Hook procedures have no user pointer, so the router lives here.
static ROUTER: RwLock<Option<HookRouter>> = RwLock::new(None);

pub fn set_router(router: Option<HookRouter>) {
    *ROUTER.write() = router;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Keyboard,
    Mouse,
}

impl HookKind {
    fn thread_name(self) -> &'static str {
        match self {
            HookKind::Keyboard => "keyjack_kbd_hook",
            HookKind::Mouse => "keyjack_mouse_hook",
        }
    }
}

/// A low-level hook and the thread whose message loop services it.
pub struct HookThread {
    kind: HookKind,
    thread_id: u32,
    handle: JoinHandle<()>,
}

impl HookThread {
    pub fn spawn(kind: HookKind) -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name(kind.thread_name().into())
            .spawn(move || {
                // Force create message queue
                unsafe {
                    let mut msg = MSG::default();
                    let _ = PeekMessageA(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
                }

                let hook = unsafe {
                    match kind {
                        HookKind::Keyboard => {
                            SetWindowsHookExA(WH_KEYBOARD_LL, Some(keyboard_proc), None, 0)
                        }
                        HookKind::Mouse => SetWindowsHookExA(WH_MOUSE_LL, Some(mouse_proc), None, 0),
                    }
                };
                let hook = match hook {
                    Ok(hook) if !hook.0.is_null() => hook,
                    Ok(_) => {
                        let _ = tx.send(Err(anyhow!("SetWindowsHookEx returned a null hook")));
                        return;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.into()));
                        return;
                    }
                };
                let _ = tx.send(Ok(unsafe { GetCurrentThreadId() }));

                unsafe {
                    let mut msg = MSG::default();
                    loop {
                        let result = GetMessageA(&mut msg, None, 0, 0);

                        if result.0 == 0 || result.0 == -1 {
                            break;
                        }

                        let _ = TranslateMessage(&msg);
                        DispatchMessageA(&msg);
                    }
                    let _ = UnhookWindowsHookEx(hook);
                }
            })?;

        match rx.recv() {
            Ok(Ok(thread_id)) => Ok(Self {
                kind,
                thread_id,
                handle,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(anyhow!("{:?} hook thread exited before installing", kind)),
        }
    }

    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// Ends the message loop, which unhooks, and joins the thread.
    pub fn stop(self) {
        unsafe {
            let _ = PostThreadMessageA(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        let _ = self.handle.join();
    }
}

#[inline]
fn route(decision: impl FnOnce(&HookRouter) -> HookDecision) -> bool {
    ROUTER
        .read()
        .as_ref()
        .is_some_and(|router| decision(router).swallows())
}

unsafe extern "system" fn keyboard_proc(code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if code < 0 {
        return unsafe { CallNextHookEx(None, code, w_param, l_param) };
    }

    let kb_struct = unsafe { &*(l_param.0 as *const KBDLLHOOKSTRUCT) };
    let event = KeyEvent {
        message: w_param.0 as u32,
        vk_code: kb_struct.vkCode,
        flags: kb_struct.flags.0,
        extra_info: kb_struct.dwExtraInfo,
    };
    if route(|router| router.on_key(&event)) {
        return LRESULT(1);
    }

    unsafe { CallNextHookEx(None, code, w_param, l_param) }
}

unsafe extern "system" fn mouse_proc(code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if code < 0 {
        return unsafe { CallNextHookEx(None, code, w_param, l_param) };
    }

    let mouse_struct = unsafe { &*(l_param.0 as *const MSLLHOOKSTRUCT) };
    let event = MouseEvent {
        message: w_param.0 as u32,
        mouse_data: mouse_struct.mouseData,
        flags: mouse_struct.flags,
        extra_info: mouse_struct.dwExtraInfo,
    };
    if route(|router| router.on_mouse(&event)) {
        return LRESULT(1);
    }

    unsafe { CallNextHookEx(None, code, w_param, l_param) }
}
