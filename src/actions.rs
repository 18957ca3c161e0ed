//! Turns `[[bindings]]` config entries into engine bindings.

use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use log::info;
use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::code::InputCode;
use crate::config::{BindingAction, BindingConfig};
use crate::engine::Binding;
use crate::inject::{Injector, MouseButton};
use crate::ramp::{MovementRamp, RampSettings, axis_value};
use crate::shim::Shim;
use crate::vjoy::{AXIS_CENTER, Axis, BUTTON_COUNT, VirtualJoystick};

/// What configured bindings act on.
#[derive(Clone)]
pub struct ActionTargets {
    pub injector: Arc<Injector>,
    pub vjoy: Arc<VirtualJoystick>,
    pub clock: SharedClock,
    pub ramp: RampSettings,
}

impl ActionTargets {
    pub fn for_shim(shim: &Shim, ramp: RampSettings) -> Self {
        Self {
            injector: shim.injector().clone(),
            vjoy: shim.virtual_joystick().clone(),
            clock: shim.clock().clone(),
            ramp,
        }
    }
}

fn target_key(target: &str) -> anyhow::Result<u16> {
    let code: InputCode = target.parse()?;
    code.virtual_key()
        .ok_or_else(|| anyhow!("`{}` is not a keyboard key", target))
}

// One axis letter followed by a sign, e.g. `x+`.
fn target_axis(target: &str) -> anyhow::Result<(Axis, i32)> {
    let target = target.trim().to_ascii_lowercase();
    let (name, direction) = match target.strip_suffix('+') {
        Some(name) => (name, 1),
        None => match target.strip_suffix('-') {
            Some(name) => (name, -1),
            None => bail!("axis target `{}` needs a + or - suffix", target),
        },
    };
    let axis = match name {
        "x" => Axis::X,
        "y" => Axis::Y,
        "z" => Axis::Z,
        "r" => Axis::R,
        "u" => Axis::U,
        "v" => Axis::V,
        _ => bail!("unknown joystick axis `{}`", name),
    };
    Ok((axis, direction))
}

/// Builds the binding described by `config`.
pub fn build_binding(config: &BindingConfig, targets: &ActionTargets) -> anyhow::Result<Binding> {
    let ActionTargets {
        injector,
        vjoy,
        clock,
        ramp,
    } = targets;
    let binding = match config.action {
        BindingAction::InjectKey => {
            let vk = target_key(&config.target)?;
            let (down, up) = (injector.clone(), injector.clone());
            Binding::edge()
                .on_press(move || down.inject_key(vk, true))
                .on_release(move || up.inject_key(vk, false))
        }
        BindingAction::FastRepeat => {
            let vk = target_key(&config.target)?;
            let (down, up) = (injector.clone(), injector.clone());
            Binding::edge()
                .on_press(move || down.inject_key_fast_repeat(vk))
                .on_release(move || up.inject_key(vk, false))
        }
        BindingAction::JoyButton => {
            let index: u8 = config
                .target
                .trim()
                .parse()
                .with_context(|| format!("invalid joystick button `{}`", config.target))?;
            if index >= BUTTON_COUNT {
                bail!("joystick button {} out of range 0..{}", index, BUTTON_COUNT);
            }
            let (down, up) = (vjoy.clone(), vjoy.clone());
            Binding::edge()
                .on_press(move || down.set_button(index, true))
                .on_release(move || up.set_button(index, false))
        }
        BindingAction::MouseButton => {
            let code: InputCode = config.target.parse()?;
            let button = MouseButton::from_code(code)
                .ok_or_else(|| anyhow!("`{}` is not a mouse button", config.target))?;
            let (down, up) = (injector.clone(), injector.clone());
            Binding::edge()
                .on_press(move || down.mouse_button(button, true))
                .on_release(move || up.mouse_button(button, false))
        }
        BindingAction::JoyAxis => {
            let (axis, direction) = target_axis(&config.target)?;
            let ramp = Arc::new(Mutex::new(MovementRamp::new(*ramp)));
            let (hold_ramp, release_ramp) = (ramp.clone(), ramp);
            let (hold, up) = (vjoy.clone(), vjoy.clone());
            let clock = clock.clone();
            Binding::edge()
                .on_hold(move || {
                    let fraction = hold_ramp.lock().fraction(true, clock.now_ms());
                    hold.set_axis(axis, axis_value(fraction, direction));
                })
                .on_release(move || {
                    release_ramp.lock().reset();
                    up.set_axis(axis, AXIS_CENTER);
                })
        }
    };
    Ok(binding)
}

/// Maps every configured binding. Stops at the first invalid entry.
pub fn apply_bindings(
    shim: &mut Shim,
    bindings: &[BindingConfig],
    ramp: RampSettings,
) -> anyhow::Result<usize> {
    let targets = ActionTargets::for_shim(shim, ramp);
    for config in bindings {
        let binding = build_binding(config, &targets)?;
        let code = shim
            .map_named(&config.trigger, binding)
            .with_context(|| format!("binding for `{}`", config.trigger))?;
        info!("{} -> {:?} {}", code, config.action, config.target);
    }
    Ok(bindings.len())
}
