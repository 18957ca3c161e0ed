//! End-to-end tests driving a shim through the fake platform.
//!
//! The fake interceptor plays the OS: tests feed it hook events and call
//! the emulated joystick and XInput queries the way a game would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keyjack::actions::apply_bindings;
use keyjack::emulation::gamepad::ERROR_SUCCESS;
use keyjack::emulation::joystick::{JOY_RETURNALL, MMSYSERR_NOERROR};
use keyjack::emulation::{GamepadState, JoyInfo, JoyInfoEx, XInputState};
use keyjack::hooks::{
    HookDecision, KEY_INJECTED_FLAG, KeyEvent, MouseEvent, WM_KEYDOWN, WM_KEYUP, WM_RBUTTONDOWN,
};
use keyjack::inject::SyntheticInput;
use keyjack::platform::fake::FakePlatform;
use keyjack::{
    Axis, Binding, BindingAction, BindingConfig, INJECTION_TAG, InputCode, InstallOptions,
    RampSettings, Shim,
};

const VK_F: u16 = 0x46;
const VK_SPACE: u16 = 0x20;
const PAD_A_MASK: u16 = 0x1000;
const PAD_B_MASK: u16 = 0x2000;

/// Creates an installed shim over a fresh fake platform.
fn installed_shim() -> (FakePlatform, Shim) {
    let fake = FakePlatform::new();
    let mut shim = Shim::new(fake.platform(), InstallOptions::default());
    shim.install();
    (fake, shim)
}

/// Edge binding that counts presses and releases.
fn counting_binding() -> (Binding, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let presses = Arc::new(AtomicUsize::new(0));
    let releases = Arc::new(AtomicUsize::new(0));
    let (p, r) = (presses.clone(), releases.clone());
    let binding = Binding::edge()
        .on_press(move || {
            p.fetch_add(1, Ordering::SeqCst);
        })
        .on_release(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
    (binding, presses, releases)
}

fn key(message: u32, vk: u16) -> KeyEvent {
    KeyEvent {
        message,
        vk_code: vk as u32,
        flags: 0,
        extra_info: 0,
    }
}

/// Tests that installing twice and uninstalling twice leaves the same
/// state as a single cycle.
#[test]
fn test_install_uninstall_symmetry() {
    let (fake, mut shim) = installed_shim();
    let (binding, _, _) = counting_binding();
    shim.map(InputCode::key(VK_F), binding).unwrap();
    assert_eq!(fake.interceptor.hooks_installed(), (true, true));
    assert!(fake.interceptor.gamepad().is_some());

    shim.install();
    assert!(shim.is_installed());
    assert_eq!(fake.interceptor.hooks_installed(), (true, true));

    shim.uninstall();
    shim.uninstall();
    assert!(!shim.is_installed());
    assert_eq!(fake.interceptor.hooks_installed(), (false, false));
    assert!(fake.interceptor.gamepad().is_none());
    assert!(fake.interceptor.joystick().is_none());
    assert!(shim.capabilities().is_empty());
    assert!(fake.gamepad.releases.load(Ordering::SeqCst) >= 1);

    let report = shim.install();
    assert!(report.keyboard_hook && report.mouse_hook);
}

/// Tests that a mapped key is hidden from the system and still reaches the
/// engine through the override table.
#[test]
fn test_mapped_key_is_swallowed_and_dispatched() {
    let (fake, mut shim) = installed_shim();
    let (binding, presses, releases) = counting_binding();
    shim.map(InputCode::key(VK_F), binding).unwrap();

    let decision = fake.interceptor.send_key(key(WM_KEYDOWN, VK_F));
    assert_eq!(
        decision,
        HookDecision::Swallow {
            code: InputCode::key(VK_F),
            down: true
        }
    );
    shim.tick().unwrap();
    assert_eq!(presses.load(Ordering::SeqCst), 1);

    assert!(fake.interceptor.send_key(key(WM_KEYUP, VK_F)).swallows());
    shim.tick().unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 1);

    // Unmapped keys are left alone
    assert_eq!(
        fake.interceptor.send_key(key(WM_KEYDOWN, 0x47)),
        HookDecision::PassThrough
    );
}

/// Tests that events produced by the injector, or flagged as injected by
/// the OS, are never swallowed.
#[test]
fn test_injected_events_pass_through() {
    let (fake, mut shim) = installed_shim();
    shim.map(InputCode::key(VK_F), Binding::edge()).unwrap();
    shim.map(InputCode::MOUSE_RIGHT, Binding::edge()).unwrap();

    let tagged = KeyEvent {
        extra_info: INJECTION_TAG,
        ..key(WM_KEYDOWN, VK_F)
    };
    let flagged = KeyEvent {
        flags: KEY_INJECTED_FLAG,
        ..key(WM_KEYDOWN, VK_F)
    };
    assert_eq!(fake.interceptor.send_key(tagged), HookDecision::PassThrough);
    assert_eq!(fake.interceptor.send_key(flagged), HookDecision::PassThrough);

    let tagged_click = MouseEvent {
        message: WM_RBUTTONDOWN,
        mouse_data: 0,
        flags: 0,
        extra_info: INJECTION_TAG,
    };
    assert_eq!(
        fake.interceptor.send_mouse(tagged_click),
        HookDecision::PassThrough
    );
    assert!(
        fake.interceptor
            .send_mouse(MouseEvent {
                extra_info: 0,
                ..tagged_click
            })
            .swallows()
    );
}

/// Tests that a real joystick reading is offset by the virtual axis and
/// clamped to the axis range.
#[test]
fn test_real_joystick_is_blended() {
    let (fake, shim) = installed_shim();
    fake.joystick.plug(JoyInfoEx {
        x: 65000,
        y: 1000,
        ..JoyInfoEx::new(JOY_RETURNALL)
    });

    let vjoy = shim.virtual_joystick();
    vjoy.set_axis(Axis::X, 32767 + 10000);
    vjoy.set_axis(Axis::Y, 32767 - 5000);
    vjoy.set_button(0, true);

    let emulator = fake
        .interceptor
        .joystick()
        .expect("install patches joystick emulation");
    let mut info = JoyInfoEx::new(JOY_RETURNALL);
    assert_eq!(emulator.get_pos_ex(0, Some(&mut info)), MMSYSERR_NOERROR);
    assert_eq!(info.x, 65535);
    assert_eq!(info.y, 0);
    assert_eq!(info.buttons & 1, 1);
}

/// Tests that without a real device the virtual joystick is reported on
/// its own.
#[test]
fn test_virtual_joystick_is_fabricated() {
    let (fake, shim) = installed_shim();
    shim.virtual_joystick().set_button(2, true);

    let emulator = fake.interceptor.joystick().unwrap();
    assert_eq!(emulator.num_devs(), 1);

    let mut info = JoyInfo::default();
    assert_eq!(emulator.get_pos(0, Some(&mut info)), MMSYSERR_NOERROR);
    assert_eq!(info.x, 32767);
    assert_eq!(info.buttons, 1 << 2);
}

/// Tests that mapped gamepad controls are hidden from XInput callers but
/// still drive the binding.
#[test]
fn test_xinput_hides_mapped_controls() {
    let (fake, mut shim) = installed_shim();
    fake.gamepad.connect(GamepadState {
        buttons: PAD_A_MASK | PAD_B_MASK,
        right_trigger: 200,
        ..Default::default()
    });
    let (binding, presses, _) = counting_binding();
    shim.map(InputCode::PAD_A, binding).unwrap();
    shim.map(InputCode::PAD_RT, Binding::edge()).unwrap();

    let emulator = fake.interceptor.gamepad().unwrap();
    let mut state = XInputState::default();
    assert_eq!(emulator.get_state(0, Some(&mut state)), ERROR_SUCCESS);
    assert_eq!(state.gamepad.buttons, PAD_B_MASK);
    assert_eq!(state.gamepad.right_trigger, 0);

    shim.tick().unwrap();
    assert_eq!(presses.load(Ordering::SeqCst), 1);
}

/// Tests that a configured key binding injects the tagged target key and
/// that uninstall releases it.
#[test]
fn test_configured_binding_injects_key() {
    let (fake, mut shim) = installed_shim();
    let bindings = [BindingConfig {
        trigger: "f".to_string(),
        action: BindingAction::InjectKey,
        target: "space".to_string(),
    }];
    apply_bindings(&mut shim, &bindings, RampSettings::default()).unwrap();
    fake.sink.take();

    fake.input.press_key(VK_F);
    shim.tick().unwrap();
    let events = fake.sink.wait_for(1, Duration::from_secs(2));
    assert_eq!(events, vec![SyntheticInput::scan_key(VK_SPACE, true)]);
    assert!(shim.injector().held_keys().contains(&VK_SPACE));

    shim.uninstall();
    assert!(shim.injector().held_keys().is_empty());
    let events = fake.sink.events();
    assert!(events.contains(&SyntheticInput::scan_key(VK_SPACE, false)));
    assert!(events.contains(&SyntheticInput::vk_key(VK_F, false)));
}

/// Tests that a game enumerating joysticks right after install, before any
/// binding writes to the virtual joystick, already sees the emulated one.
#[test]
fn test_joystick_visible_before_first_write() {
    let (fake, shim) = installed_shim();
    let emulator = fake
        .interceptor
        .joystick()
        .expect("install patches joystick emulation");
    assert_eq!(emulator.num_devs(), 1);

    let mut info = JoyInfo::default();
    assert_eq!(emulator.get_pos(0, Some(&mut info)), MMSYSERR_NOERROR);
    assert_eq!(info.x, 32767);
    assert!(shim.virtual_joystick().snapshot().is_neutral());
}

fn is_key_event(event: &SyntheticInput, vk: u16) -> bool {
    *event == SyntheticInput::scan_key(vk, true)
        || *event == SyntheticInput::scan_key(vk, false)
        || *event == SyntheticInput::vk_key(vk, false)
}

/// Tests that uninstalling while a fast-repeat key is repeating leaves the
/// key released, and that unmapped keys the user holds get no key-up.
#[test]
fn test_uninstall_during_repeat_leaves_nothing_pressed() {
    let (fake, mut shim) = installed_shim();
    let bindings = [BindingConfig {
        trigger: "f".to_string(),
        action: BindingAction::FastRepeat,
        target: "space".to_string(),
    }];
    apply_bindings(&mut shim, &bindings, RampSettings::default()).unwrap();
    fake.sink.take();

    fake.input.press_key(0x10);
    fake.input.press_key(VK_F);
    shim.tick().unwrap();
    // Key-down plus the immediate repeat
    fake.sink.wait_for(2, Duration::from_secs(2));
    fake.clock.advance(50);
    fake.sink.wait_for(3, Duration::from_secs(2));

    shim.uninstall();
    let events = fake.sink.events();
    let last_space = events.iter().rev().find(|e| is_key_event(e, VK_SPACE));
    assert!(matches!(
        last_space,
        Some(&SyntheticInput::Key { down: false, .. })
    ));
    assert!(shim.injector().held_keys().is_empty());
    assert!(!events.contains(&SyntheticInput::vk_key(0x10, false)));
    assert!(!events.contains(&SyntheticInput::scan_key(0x10, false)));
}
