#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use std::thread;
    use std::time::Duration;

    use anyhow::Context;
    use keyjack::actions::apply_bindings;
    use keyjack::{InstallOptions, Shim, ShimConfig, logging, signal};
    use log::{info, warn};
    use windows::Win32::Media::{timeBeginPeriod, timeEndPeriod};

    // Load config or create default if not exists
    let config = ShimConfig::load_or_create("keyjack.toml")
        .context("Failed to load configuration from keyjack.toml")?;
    logging::init(config.level_filter());

    signal::set_control_ctrl_handler().context("Failed to install console handler")?;

    // Request 1ms timer resolution for precise repeat timing
    unsafe { timeBeginPeriod(1) };

    let mut shim = Shim::new(
        keyjack::platform::windows::platform(),
        InstallOptions::from(&config),
    );
    {
        let engine = shim.engine_mut()?;
        engine.set_mouse_move_scale(config.mouse_move_scale);
        engine.set_mouse_move_deadzone(config.mouse_move_deadzone);
    }

    let report = shim.install();
    if !(report.keyboard_hook || report.mouse_hook) {
        warn!("no input hooks installed, only gamepad input will be mapped");
    }
    let mapped = apply_bindings(&mut shim, &config.bindings, config.movement_ramp)?;
    info!("{} bindings registered", mapped);
    shim.start()?;

    info!("running, press Ctrl+C to exit");
    while !signal::shutdown_requested() {
        thread::sleep(Duration::from_millis(50));
    }

    info!("shutting down");
    shim.uninstall();
    unsafe { timeEndPeriod(1) };
    Ok(())
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("keyjack hooks Win32 input and only runs on Windows")
}
