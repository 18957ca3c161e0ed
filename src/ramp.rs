//! Hold-time acceleration for digital inputs driving an analog axis.

use serde::{Deserialize, Serialize};

use crate::vjoy::AXIS_CENTER;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampSettings {
    /// Fraction reported as soon as a direction is held.
    pub min_effective: f32,
    /// Fraction reported once the ramp completes.
    pub max_speed: f32,
    pub ramp_time_ms: i64,
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            min_effective: 0.1,
            max_speed: 1.0,
            ramp_time_ms: 1000,
        }
    }
}

impl RampSettings {
    /// Both fractions pulled into 0..=1 with `max_speed >= min_effective`.
    pub fn clamped(self) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let min_effective = clamp(self.min_effective);
        let max_speed = clamp(self.max_speed).max(min_effective);
        Self {
            min_effective,
            max_speed,
            ramp_time_ms: self.ramp_time_ms,
        }
    }
}

/// Tracks how long one axis has been pushed and maps that to a speed
/// fraction. X and Y use separate ramps.
#[derive(Debug, Clone)]
pub struct MovementRamp {
    settings: RampSettings,
    started_ms: Option<u64>,
}

impl MovementRamp {
    pub fn new(settings: RampSettings) -> Self {
        Self {
            settings: settings.clamped(),
            started_ms: None,
        }
    }

    pub fn settings(&self) -> RampSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: RampSettings) {
        self.settings = settings.clamped();
    }

    /// Current fraction. Releasing restarts the ramp on the next hold.
    pub fn fraction(&mut self, held: bool, now_ms: u64) -> f32 {
        if !held {
            self.started_ms = None;
            return 0.0;
        }
        let start = *self.started_ms.get_or_insert(now_ms);
        let RampSettings {
            min_effective,
            max_speed,
            ramp_time_ms,
        } = self.settings;
        if ramp_time_ms <= 0 {
            return max_speed;
        }

        let elapsed = now_ms.saturating_sub(start) as f64;
        let progress = (elapsed / ramp_time_ms as f64).clamp(0.0, 1.0);
        (min_effective as f64 + progress * (max_speed - min_effective) as f64) as f32
    }

    pub fn reset(&mut self) {
        self.started_ms = None;
    }
}

/// Joystick axis position for `fraction` of full deflection toward
/// `direction` (negative, zero or positive).
pub fn axis_value(fraction: f32, direction: i32) -> u16 {
    let center = AXIS_CENTER as f32;
    let offset = center * fraction.clamp(0.0, 1.0);
    match direction.signum() {
        1 => (center + offset) as u16,
        -1 => (center - offset) as u16,
        _ => AXIS_CENTER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_progression() {
        let mut ramp = MovementRamp::new(RampSettings::default());
        assert_eq!(ramp.fraction(false, 0), 0.0);
        assert!((ramp.fraction(true, 1000) - 0.1).abs() < 1e-6);
        assert!((ramp.fraction(true, 1500) - 0.55).abs() < 1e-6);
        assert_eq!(ramp.fraction(true, 2000), 1.0);
        assert_eq!(ramp.fraction(true, 9000), 1.0);

        // Release restarts from the minimum
        assert_eq!(ramp.fraction(false, 9001), 0.0);
        assert!((ramp.fraction(true, 9002) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_zero_ramp_time_is_immediate() {
        let mut ramp = MovementRamp::new(RampSettings {
            ramp_time_ms: 0,
            max_speed: 0.8,
            ..Default::default()
        });
        assert_eq!(ramp.fraction(true, 5), 0.8);
    }

    #[test]
    fn test_settings_clamped() {
        let s = RampSettings {
            min_effective: 0.6,
            max_speed: 4.0,
            ramp_time_ms: 10,
        }
        .clamped();
        assert_eq!(s.max_speed, 1.0);

        let s = RampSettings {
            min_effective: 0.7,
            max_speed: 0.2,
            ramp_time_ms: 10,
        }
        .clamped();
        assert_eq!(s.max_speed, 0.7);

        let s = RampSettings {
            min_effective: -1.0,
            max_speed: f32::NAN,
            ramp_time_ms: 10,
        }
        .clamped();
        assert_eq!((s.min_effective, s.max_speed), (0.0, 0.0));
    }

    #[test]
    fn test_axis_value() {
        assert_eq!(axis_value(0.0, 1), AXIS_CENTER);
        assert_eq!(axis_value(1.0, 0), AXIS_CENTER);
        assert_eq!(axis_value(1.0, 1), 65534);
        assert_eq!(axis_value(1.0, -5), 0);
        assert_eq!(axis_value(0.5, -1), 16383);
    }
}
