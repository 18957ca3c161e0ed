use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::{fs, path::Path};

use log::LevelFilter;

use crate::engine::{DEFAULT_MOUSE_MOVE_DEADZONE, DEFAULT_MOUSE_MOVE_SCALE};
use crate::ramp::RampSettings;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShimConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_mouse_move_scale")]
    pub mouse_move_scale: f32,
    #[serde(default)]
    pub mouse_move_deadzone: i32,
    /// 0 runs the polling loop without sleeping.
    #[serde(default)]
    pub min_tick_interval_us: u64,
    #[serde(default = "default_true")]
    pub install_keyboard_hook: bool,
    #[serde(default = "default_true")]
    pub install_mouse_hook: bool,
    #[serde(default = "default_true")]
    pub emulate_joystick: bool,
    #[serde(default = "default_true")]
    pub emulate_xinput: bool,
    #[serde(default)]
    pub movement_ramp: RampSettings,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingAction {
    /// Hold the target key while the trigger is held.
    InjectKey,
    /// Like `InjectKey` but repeats immediately without the initial delay.
    FastRepeat,
    /// Drive a virtual joystick button (target is the index 0..31).
    JoyButton,
    /// Hold a mouse button while the trigger is held.
    MouseButton,
    /// Push a virtual joystick axis along the movement ramp (target such
    /// as `x+` or `y-`).
    JoyAxis,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BindingConfig {
    pub trigger: String,
    pub action: BindingAction,
    pub target: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_mouse_move_scale() -> f32 {
    DEFAULT_MOUSE_MOVE_SCALE
}
fn default_true() -> bool {
    true
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            mouse_move_scale: DEFAULT_MOUSE_MOVE_SCALE,
            mouse_move_deadzone: DEFAULT_MOUSE_MOVE_DEADZONE,
            min_tick_interval_us: 0,
            install_keyboard_hook: true,
            install_mouse_hook: true,
            emulate_joystick: true,
            emulate_xinput: true,
            movement_ramp: RampSettings::default(),
            bindings: Vec::new(),
        }
    }
}

impl ShimConfig {
    /// Load config from file, or write the default one if it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            let default_config = Self::default();
            default_config.save_to_file(&path)?;
            return Ok(default_config);
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: ShimConfig = toml::from_str(&content)?;
        config.validate();
        Ok(config)
    }

    fn validate(&mut self) {
        if self.mouse_move_scale.is_nan() || self.mouse_move_scale < 0.0 {
            self.mouse_move_scale = 0.0;
        }
        if self.mouse_move_deadzone < 0 {
            self.mouse_move_deadzone = 0;
        }
        if LevelFilter::from_str(&self.log_level).is_err() {
            self.log_level = default_log_level();
        }
        self.movement_ramp = self.movement_ramp.clamped();
        if self.movement_ramp.ramp_time_ms < 0 {
            self.movement_ramp.ramp_time_ms = 0;
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }

    pub fn min_tick_interval(&self) -> Option<std::time::Duration> {
        (self.min_tick_interval_us > 0)
            .then(|| std::time::Duration::from_micros(self.min_tick_interval_us))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let mut result = format!(
            "log_level = \"{}\"            # error, warn, info, debug, trace (RUST_LOG wins)\n\
             mouse_move_scale = {:?}        # Multiplier applied to raw cursor deltas\n\
             mouse_move_deadzone = {}        # Scaled deltas at or below this are dropped\n\
             min_tick_interval_us = {}       # Minimum polling period (0 = never sleep)\n\
             install_keyboard_hook = {}   # Swallow mapped keys system-wide\n\
             install_mouse_hook = {}      # Swallow mapped mouse buttons system-wide\n\
             emulate_joystick = {}        # Answer winmm joystick queries with the virtual joystick\n\
             emulate_xinput = {}          # Hide mapped controls from XInputGetState\n\n\
             # Analog ramp for digital direction inputs\n\
             [movement_ramp]\n\
             min_effective = {:?}           # Fraction applied as soon as a direction is held\n\
             max_speed = {:?}               # Fraction reached after ramp_time_ms\n\
             ramp_time_ms = {}            # 0 = jump straight to max_speed\n\n\
             # Binding definitions (action = inject_key | fast_repeat | joy_button | mouse_button | joy_axis)\n",
            self.log_level,
            self.mouse_move_scale,
            self.mouse_move_deadzone,
            self.min_tick_interval_us,
            self.install_keyboard_hook,
            self.install_mouse_hook,
            self.emulate_joystick,
            self.emulate_xinput,
            self.movement_ramp.min_effective,
            self.movement_ramp.max_speed,
            self.movement_ramp.ramp_time_ms,
        );

        if self.bindings.is_empty() {
            result.push_str(
                "# [[bindings]]\n\
                 # trigger = \"XboxA\"\n\
                 # action = \"inject_key\"\n\
                 # target = \"space\"\n",
            );
        }

        for binding in &self.bindings {
            let action = match binding.action {
                BindingAction::InjectKey => "inject_key",
                BindingAction::FastRepeat => "fast_repeat",
                BindingAction::JoyButton => "joy_button",
                BindingAction::MouseButton => "mouse_button",
                BindingAction::JoyAxis => "joy_axis",
            };
            result.push_str("[[bindings]]\n");
            result.push_str(&format!(
                "trigger = \"{}\"            # Physical input that drives the binding\n",
                binding.trigger
            ));
            result.push_str(&format!("action = \"{}\"\n", action));
            result.push_str(&format!(
                "target = \"{}\"             # Key, joystick button index, mouse button or axis\n",
                binding.target
            ));
            result.push('\n');
        }

        fs::write(path, result)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ShimConfig = toml::from_str("log_level = \"debug\"\n").unwrap();
        assert_eq!(config.level_filter(), LevelFilter::Debug);
        assert_eq!(config.mouse_move_scale, DEFAULT_MOUSE_MOVE_SCALE);
        assert!(config.install_keyboard_hook);
        assert!(config.bindings.is_empty());
        assert_eq!(config.movement_ramp, RampSettings::default());
        assert_eq!(config.min_tick_interval(), None);
    }

    #[test]
    fn test_validate_clamps() {
        let mut config: ShimConfig = toml::from_str(
            "log_level = \"loud\"\n\
             mouse_move_scale = -3.0\n\
             mouse_move_deadzone = -7\n\
             [movement_ramp]\n\
             min_effective = 0.5\n\
             max_speed = 0.25\n\
             ramp_time_ms = -10\n",
        )
        .unwrap();
        config.validate();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.mouse_move_scale, 0.0);
        assert_eq!(config.mouse_move_deadzone, 0);
        assert_eq!(config.movement_ramp.max_speed, 0.5);
        assert_eq!(config.movement_ramp.ramp_time_ms, 0);
    }

    #[test]
    fn test_default_example_binding_is_commented_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keyjack.toml");
        ShimConfig::default().save_to_file(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("# trigger = \"XboxA\""));
        assert!(ShimConfig::load_from_file(&path).unwrap().bindings.is_empty());
    }

    #[test]
    fn test_binding_actions_parse() {
        let config: ShimConfig = toml::from_str(
            "[[bindings]]\n\
             trigger = \"XboxLT\"\n\
             action = \"joy_button\"\n\
             target = \"4\"\n",
        )
        .unwrap();
        assert_eq!(config.bindings[0].action, BindingAction::JoyButton);
    }
}
