//! The shim context: owns every component and orders install / uninstall so
//! nothing is left held across a cycle.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::capability::{CapabilityTable, OverrideTable};
use crate::clock::SharedClock;
use crate::code::InputCode;
use crate::config::ShimConfig;
use crate::emulation::{GamepadEmulator, JoystickEmulator};
use crate::engine::{Binding, ControlMapper, GamepadPoller};
use crate::error::ShimError;
use crate::hooks::HookRouter;
use crate::inject::{Injector, release_codes};
use crate::platform::Platform;
use crate::tick::TickLoop;
use crate::vjoy::VirtualJoystick;

const RELEASE_GAP: Duration = Duration::from_millis(1);

/// Which interception points [`Shim::install`] sets up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    pub keyboard_hook: bool,
    pub mouse_hook: bool,
    /// Patches joystick emulation in at install. The first virtual joystick
    /// write patches again to catch modules loaded since.
    pub joystick: bool,
    pub xinput: bool,
    pub min_tick_interval: Option<Duration>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            keyboard_hook: true,
            mouse_hook: true,
            joystick: true,
            xinput: true,
            min_tick_interval: None,
        }
    }
}

impl From<&ShimConfig> for InstallOptions {
    fn from(config: &ShimConfig) -> Self {
        Self {
            keyboard_hook: config.install_keyboard_hook,
            mouse_hook: config.install_mouse_hook,
            joystick: config.emulate_joystick,
            xinput: config.emulate_xinput,
            min_tick_interval: config.min_tick_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub keyboard_hook: bool,
    pub mouse_hook: bool,
    pub joystick_armed: bool,
    pub joystick_patches: usize,
    pub gamepad_patches: usize,
}

pub struct Shim {
    platform: Platform,
    options: InstallOptions,
    capabilities: Arc<CapabilityTable>,
    overrides: Arc<OverrideTable>,
    vjoy: Arc<VirtualJoystick>,
    injector: Arc<Injector>,
    joystick: Arc<JoystickEmulator>,
    gamepad: Arc<GamepadEmulator>,
    // None while the tick loop owns it
    engine: Option<ControlMapper>,
    ticker: Option<TickLoop>,
    installed: bool,
}

impl Shim {
    pub fn new(platform: Platform, options: InstallOptions) -> Self {
        let capabilities = Arc::new(CapabilityTable::new());
        let overrides = Arc::new(OverrideTable::new());
        let vjoy = Arc::new(VirtualJoystick::new());
        let injector = Arc::new(Injector::new(
            platform.sink.clone(),
            platform.clock.clone(),
            platform.repeat_timing,
        ));
        let joystick = Arc::new(JoystickEmulator::new(
            platform.joystick.clone(),
            vjoy.clone(),
            capabilities.clone(),
            platform.clock.clone(),
        ));
        let gamepad = Arc::new(GamepadEmulator::new(
            platform.gamepad.clone(),
            capabilities.clone(),
        ));
        let engine = Self::build_engine(&platform, &capabilities, &overrides);

        Self {
            platform,
            options,
            capabilities,
            overrides,
            vjoy,
            injector,
            joystick,
            gamepad,
            engine: Some(engine),
            ticker: None,
            installed: false,
        }
    }

    fn build_engine(
        platform: &Platform,
        capabilities: &Arc<CapabilityTable>,
        overrides: &Arc<OverrideTable>,
    ) -> ControlMapper {
        ControlMapper::new(
            capabilities.clone(),
            overrides.clone(),
            platform.input.clone(),
            GamepadPoller::new(platform.gamepad.clone(), platform.clock.clone()),
        )
    }

    #[inline]
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn options(&self) -> InstallOptions {
        self.options
    }

    pub fn capabilities(&self) -> &Arc<CapabilityTable> {
        &self.capabilities
    }

    pub fn injector(&self) -> &Arc<Injector> {
        &self.injector
    }

    pub fn virtual_joystick(&self) -> &Arc<VirtualJoystick> {
        &self.vjoy
    }

    pub fn joystick_emulator(&self) -> &Arc<JoystickEmulator> {
        &self.joystick
    }

    pub fn gamepad_emulator(&self) -> &Arc<GamepadEmulator> {
        &self.gamepad
    }

    pub fn clock(&self) -> &SharedClock {
        &self.platform.clock
    }

    /// The mapping engine, available while the tick loop is stopped.
    pub fn engine_mut(&mut self) -> Result<&mut ControlMapper, ShimError> {
        self.engine.as_mut().ok_or(ShimError::AlreadyRunning)
    }

    pub fn map(&mut self, code: InputCode, binding: Binding) -> Result<(), ShimError> {
        self.engine_mut()?.map(code, binding)
    }

    pub fn map_named(&mut self, name: &str, binding: Binding) -> Result<InputCode, ShimError> {
        self.engine_mut()?.map_named(name, binding)
    }

    /// Runs one engine tick on the calling thread.
    pub fn tick(&mut self) -> Result<(), ShimError> {
        self.engine_mut()?.tick();
        Ok(())
    }

    /// Releases stale input, resets state, then installs hooks and patches.
    /// Installing again first uninstalls.
    pub fn install(&mut self) -> InstallReport {
        if self.installed {
            self.uninstall();
        }

        self.release_physical();
        self.injector.release_all();
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
        self.vjoy.reset();

        let router = HookRouter::new(self.capabilities.clone(), self.overrides.clone());
        let interceptor = self.platform.interceptor.clone();
        let mut report = InstallReport::default();

        if self.options.keyboard_hook {
            report.keyboard_hook = interceptor.install_keyboard_hook(router.clone());
            if !report.keyboard_hook {
                warn!("keyboard hook unavailable, mapped keys will pass through");
            }
        }
        if self.options.mouse_hook {
            report.mouse_hook = interceptor.install_mouse_hook(router);
            if !report.mouse_hook {
                warn!("mouse hook unavailable, mapped buttons will pass through");
            }
        }
        if self.options.xinput {
            report.gamepad_patches = interceptor.install_gamepad_emulation(self.gamepad.clone());
            if report.gamepad_patches == 0 {
                debug!("no XInput imports patched yet");
            }
        }
        if self.options.joystick {
            report.joystick_patches = interceptor.install_joystick_emulation(self.joystick.clone());
            let emulator = self.joystick.clone();
            self.vjoy.set_activator(move || {
                let patched = interceptor.install_joystick_emulation(emulator.clone());
                debug!("joystick emulation refreshed, {} import slots patched", patched);
            });
            report.joystick_armed = true;
        }

        self.installed = true;
        info!("installed: {:?}", report);
        report
    }

    /// Tears everything down in reverse. Safe to call when not installed.
    pub fn uninstall(&mut self) {
        self.stop();
        let interceptor = self.platform.interceptor.clone();
        interceptor.remove_hooks();

        self.release_physical();
        self.vjoy.reset();
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
        self.vjoy.clear_activator();

        self.injector.shutdown();

        interceptor.remove_emulation();
        self.platform.joystick.release();
        self.platform.gamepad.release();
        self.joystick.invalidate_probes();

        if self.installed {
            info!("uninstalled");
        }
        self.installed = false;
    }

    /// Moves the engine onto the polling thread.
    pub fn start(&mut self) -> Result<(), ShimError> {
        let engine = self.engine.take().ok_or(ShimError::AlreadyRunning)?;
        match TickLoop::spawn(engine, self.options.min_tick_interval) {
            Ok(ticker) => {
                self.ticker = Some(ticker);
                Ok(())
            }
            Err(failed) => {
                let failed = *failed;
                self.engine = Some(failed.mapper);
                Err(failed.error)
            }
        }
    }

    /// Stops the polling thread and takes the engine back. A no-op when not
    /// running.
    pub fn stop(&mut self) {
        let Some(ticker) = self.ticker.take() else {
            return;
        };
        let engine = ticker.stop().unwrap_or_else(|| {
            Self::build_engine(&self.platform, &self.capabilities, &self.overrides)
        });
        self.engine = Some(engine);
    }

    /// Key-ups for every mapped key and mouse button the engine holds.
    /// Unmapped input the user is holding is left alone.
    fn release_physical(&self) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        let codes = engine.held_codes();
        if !codes.is_empty() {
            debug!("releasing {} held inputs", codes.len());
            release_codes(self.platform.sink.as_ref(), &codes, RELEASE_GAP);
        }
    }
}

impl Drop for Shim {
    fn drop(&mut self) {
        self.uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::{MouseButton, SyntheticInput};
    use crate::platform::fake::FakePlatform;
    use crate::vjoy::Axis;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_install_releases_held_mapped_input() {
        let fake = FakePlatform::new();
        let mut shim = Shim::new(fake.platform(), InstallOptions::default());
        shim.map(InputCode(0x57), Binding::edge()).unwrap();
        shim.map(InputCode::MOUSE_X1, Binding::edge()).unwrap();
        fake.input.press_key(0x57);
        fake.input.press_key(0x10);
        fake.input.press_button(MouseButton::X1);
        shim.tick().unwrap();

        let report = shim.install();
        assert!(report.keyboard_hook && report.mouse_hook && report.joystick_armed);

        let events = fake.sink.events();
        assert!(events.contains(&SyntheticInput::vk_key(0x57, false)));
        assert!(events.contains(&SyntheticInput::scan_key(0x57, false)));
        assert!(events.contains(&SyntheticInput::MouseButton {
            button: MouseButton::X1,
            down: false
        }));
        // Shift is held but unmapped
        assert!(!events.contains(&SyntheticInput::vk_key(0x10, false)));
        assert!(!events.contains(&SyntheticInput::scan_key(0x10, false)));
    }

    #[test]
    fn test_options_skip_components() {
        let fake = FakePlatform::new();
        let mut shim = Shim::new(
            fake.platform(),
            InstallOptions {
                mouse_hook: false,
                joystick: false,
                ..Default::default()
            },
        );
        let report = shim.install();
        assert_eq!(
            report,
            InstallReport {
                keyboard_hook: true,
                mouse_hook: false,
                joystick_armed: false,
                joystick_patches: 0,
                gamepad_patches: 1,
            }
        );
        assert_eq!(fake.interceptor.hooks_installed(), (true, false));
    }

    #[test]
    fn test_joystick_patched_at_install() {
        let fake = FakePlatform::new();
        let mut shim = Shim::new(fake.platform(), InstallOptions::default());
        let report = shim.install();
        assert!(fake.interceptor.joystick().is_some());
        assert_eq!(report.joystick_patches, 5);
        assert_eq!(fake.interceptor.joystick_installs.load(Ordering::SeqCst), 1);

        // The first write patches once more, later writes do not
        shim.virtual_joystick().set_axis(Axis::X, 100);
        shim.virtual_joystick().set_axis(Axis::Y, 100);
        assert_eq!(fake.interceptor.joystick_installs.load(Ordering::SeqCst), 2);

        shim.uninstall();
        assert!(fake.interceptor.joystick().is_none());
    }

    #[test]
    fn test_uninstall_fires_releases_and_empties_tables() {
        let fake = FakePlatform::new();
        let mut shim = Shim::new(fake.platform(), InstallOptions::default());
        shim.install();

        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        shim.map(
            InputCode(0x41),
            Binding::edge().on_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        fake.input.press_key(0x41);
        shim.tick().unwrap();

        shim.uninstall();
        shim.uninstall();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(shim.capabilities().is_empty());
        assert!(shim.virtual_joystick().snapshot().is_neutral());
        assert!(!shim.is_installed());
        assert_eq!(fake.joystick.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mapping_rejected_while_running() {
        let fake = FakePlatform::new();
        let mut shim = Shim::new(fake.platform(), InstallOptions::default());
        shim.install();
        shim.start().unwrap();
        assert!(shim.is_running());
        assert!(matches!(
            shim.map(InputCode(0x41), Binding::edge()),
            Err(ShimError::AlreadyRunning)
        ));
        assert!(matches!(shim.start(), Err(ShimError::AlreadyRunning)));

        shim.stop();
        assert!(!shim.is_running());
        shim.map(InputCode(0x41), Binding::edge()).unwrap();
    }
}
