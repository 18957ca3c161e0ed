//! In-memory adapters. Hooks become routers the test drives by hand,
//! injected input is recorded, and devices are plain shared state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{Interceptor, Platform};
use crate::capability::{CapabilityTable, OverrideTable};
use crate::clock::ManualClock;
use crate::emulation::gamepad::{ERROR_DEVICE_NOT_CONNECTED, ERROR_SUCCESS};
use crate::emulation::joystick::{JOYERR_UNPLUGGED, MMSYSERR_NOERROR};
use crate::emulation::{
    GamepadApi, GamepadEmulator, GamepadState, JoyCapsA, JoyCapsW, JoyInfo, JoyInfoEx,
    JoystickApi, JoystickEmulator, XInputState,
};
use crate::engine::{ControlMapper, GamepadPoller, InputSource};
use crate::hooks::{HookDecision, HookRouter, KeyEvent, MouseEvent};
use crate::inject::{InputSink, MouseButton, RepeatTiming, SyntheticInput};

#[derive(Default)]
pub struct FakeInput {
    keys: Mutex<HashSet<u16>>,
    buttons: Mutex<HashSet<MouseButton>>,
    cursor: Mutex<Option<(i32, i32)>>,
}

impl FakeInput {
    pub fn press_key(&self, vk: u16) {
        self.keys.lock().insert(vk);
    }

    pub fn release_key(&self, vk: u16) {
        self.keys.lock().remove(&vk);
    }

    pub fn press_button(&self, button: MouseButton) {
        self.buttons.lock().insert(button);
    }

    pub fn release_button(&self, button: MouseButton) {
        self.buttons.lock().remove(&button);
    }

    pub fn set_cursor(&self, x: i32, y: i32) {
        *self.cursor.lock() = Some((x, y));
    }
}

impl InputSource for FakeInput {
    fn key_down(&self, vk: u16) -> bool {
        self.keys.lock().contains(&vk)
    }

    fn mouse_button_down(&self, button: MouseButton) -> bool {
        self.buttons.lock().contains(&button)
    }

    fn cursor_pos(&self) -> Option<(i32, i32)> {
        *self.cursor.lock()
    }
}

/// Records everything sent to it.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyntheticInput>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SyntheticInput> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<SyntheticInput> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Polls until at least `count` events arrived or `timeout` passed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<SyntheticInput> {
        let deadline = Instant::now() + timeout;
        while self.len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        self.events()
    }
}

impl InputSink for RecordingSink {
    fn send(&self, inputs: &[SyntheticInput]) {
        self.events.lock().extend_from_slice(inputs);
    }
}

/// One joystick at id 0 that can be plugged and unplugged.
pub struct FakeJoystick {
    plugged: AtomicBool,
    state: Mutex<JoyInfoEx>,
    pub releases: AtomicUsize,
}

impl Default for FakeJoystick {
    fn default() -> Self {
        Self {
            plugged: AtomicBool::new(false),
            state: Mutex::new(JoyInfoEx::new(0)),
            releases: AtomicUsize::new(0),
        }
    }
}

impl FakeJoystick {
    pub fn plug(&self, state: JoyInfoEx) {
        *self.state.lock() = state;
        self.plugged.store(true, Ordering::SeqCst);
    }

    pub fn unplug(&self) {
        self.plugged.store(false, Ordering::SeqCst);
    }

    fn connected(&self, id: usize) -> bool {
        id == 0 && self.plugged.load(Ordering::SeqCst)
    }
}

impl JoystickApi for FakeJoystick {
    fn num_devs(&self) -> u32 {
        self.connected(0) as u32
    }

    fn get_pos(&self, id: u32, info: &mut JoyInfo) -> u32 {
        if !self.connected(id as usize) {
            return JOYERR_UNPLUGGED;
        }
        let state = self.state.lock();
        *info = JoyInfo {
            x: state.x,
            y: state.y,
            z: state.z,
            buttons: state.buttons & 0xFFFF,
        };
        MMSYSERR_NOERROR
    }

    fn get_pos_ex(&self, id: u32, info: &mut JoyInfoEx) -> u32 {
        if !self.connected(id as usize) {
            return JOYERR_UNPLUGGED;
        }
        let size = info.size;
        *info = *self.state.lock();
        info.size = size;
        MMSYSERR_NOERROR
    }

    fn get_dev_caps_a(&self, id: usize, caps: &mut JoyCapsA) -> u32 {
        if !self.connected(id) {
            return JOYERR_UNPLUGGED;
        }
        *caps = JoyCapsA::fabricated();
        caps.mid = 0x045E;
        MMSYSERR_NOERROR
    }

    fn get_dev_caps_w(&self, id: usize, caps: &mut JoyCapsW) -> u32 {
        if !self.connected(id) {
            return JOYERR_UNPLUGGED;
        }
        *caps = JoyCapsW::fabricated();
        caps.mid = 0x045E;
        MMSYSERR_NOERROR
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// One controller in slot 0.
#[derive(Default)]
pub struct FakeGamepad {
    state: Mutex<Option<GamepadState>>,
    pub releases: AtomicUsize,
}

impl FakeGamepad {
    pub fn connect(&self, state: GamepadState) {
        *self.state.lock() = Some(state);
    }

    pub fn disconnect(&self) {
        *self.state.lock() = None;
    }
}

impl GamepadApi for FakeGamepad {
    fn get_state(&self, user_index: u32, state: &mut XInputState) -> u32 {
        match *self.state.lock() {
            Some(pad) if user_index == 0 => {
                state.packet_number = state.packet_number.wrapping_add(1);
                state.gamepad = pad;
                ERROR_SUCCESS
            }
            _ => ERROR_DEVICE_NOT_CONNECTED,
        }
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps whatever the shim installs so a test can play the OS: feed hook
/// events and call the emulated queries as an application would.
#[derive(Default)]
pub struct FakeInterceptor {
    keyboard: Mutex<Option<HookRouter>>,
    mouse: Mutex<Option<HookRouter>>,
    joystick: Mutex<Option<Arc<JoystickEmulator>>>,
    gamepad: Mutex<Option<Arc<GamepadEmulator>>>,
    pub fail_keyboard_hook: AtomicBool,
    pub fail_mouse_hook: AtomicBool,
    pub joystick_installs: AtomicUsize,
}

impl FakeInterceptor {
    /// What the OS would do with this keyboard event. Passes through when
    /// no hook is installed.
    pub fn send_key(&self, event: KeyEvent) -> HookDecision {
        match &*self.keyboard.lock() {
            Some(router) => router.on_key(&event),
            None => HookDecision::PassThrough,
        }
    }

    pub fn send_mouse(&self, event: MouseEvent) -> HookDecision {
        match &*self.mouse.lock() {
            Some(router) => router.on_mouse(&event),
            None => HookDecision::PassThrough,
        }
    }

    pub fn hooks_installed(&self) -> (bool, bool) {
        (self.keyboard.lock().is_some(), self.mouse.lock().is_some())
    }

    pub fn joystick(&self) -> Option<Arc<JoystickEmulator>> {
        self.joystick.lock().clone()
    }

    pub fn gamepad(&self) -> Option<Arc<GamepadEmulator>> {
        self.gamepad.lock().clone()
    }
}

impl Interceptor for FakeInterceptor {
    fn install_keyboard_hook(&self, router: HookRouter) -> bool {
        if self.fail_keyboard_hook.load(Ordering::SeqCst) {
            return false;
        }
        *self.keyboard.lock() = Some(router);
        true
    }

    fn install_mouse_hook(&self, router: HookRouter) -> bool {
        if self.fail_mouse_hook.load(Ordering::SeqCst) {
            return false;
        }
        *self.mouse.lock() = Some(router);
        true
    }

    fn remove_hooks(&self) {
        self.keyboard.lock().take();
        self.mouse.lock().take();
    }

    fn install_joystick_emulation(&self, emulator: Arc<JoystickEmulator>) -> usize {
        self.joystick_installs.fetch_add(1, Ordering::SeqCst);
        *self.joystick.lock() = Some(emulator);
        5
    }

    fn install_gamepad_emulation(&self, emulator: Arc<GamepadEmulator>) -> usize {
        *self.gamepad.lock() = Some(emulator);
        1
    }

    fn remove_emulation(&self) {
        self.joystick.lock().take();
        self.gamepad.lock().take();
    }
}

/// A full set of fakes sharing one manual clock.
pub struct FakePlatform {
    pub input: Arc<FakeInput>,
    pub sink: Arc<RecordingSink>,
    pub joystick: Arc<FakeJoystick>,
    pub gamepad: Arc<FakeGamepad>,
    pub interceptor: Arc<FakeInterceptor>,
    pub clock: Arc<ManualClock>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            input: Arc::new(FakeInput::default()),
            sink: Arc::new(RecordingSink::default()),
            joystick: Arc::new(FakeJoystick::default()),
            gamepad: Arc::new(FakeGamepad::default()),
            interceptor: Arc::new(FakeInterceptor::default()),
            clock: ManualClock::new(0),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            interceptor: self.interceptor.clone(),
            sink: self.sink.clone(),
            input: self.input.clone(),
            joystick: self.joystick.clone(),
            gamepad: self.gamepad.clone(),
            clock: self.clock.clone(),
            repeat_timing: RepeatTiming::default(),
        }
    }

    /// A standalone mapper reading this platform's input and gamepad.
    pub fn mapper(&self) -> ControlMapper {
        ControlMapper::new(
            Arc::new(CapabilityTable::new()),
            Arc::new(OverrideTable::new()),
            self.input.clone(),
            GamepadPoller::new(self.gamepad.clone(), self.clock.clone()),
        )
    }
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}
