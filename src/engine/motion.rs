//! Cursor-delta tracking for the mouse-move code.

pub const DEFAULT_MOUSE_MOVE_SCALE: f32 = 0.20;
pub const DEFAULT_MOUSE_MOVE_DEADZONE: i32 = 0;

/// Rounds `raw * scale`, keeping small non-zero motion at one unit so slow
/// movement is not lost to rounding.
#[inline]
pub fn scale_mouse_delta(raw: i32, scale: f32) -> i32 {
    let scaled = (raw as f32 * scale).round() as i32;
    if scaled == 0 && raw != 0 && scale > 0.0 {
        raw.signum()
    } else {
        scaled
    }
}

#[derive(Debug, Clone)]
pub struct MouseMotion {
    last: Option<(i32, i32)>,
    scale: f32,
    deadzone: i32,
}

impl MouseMotion {
    pub fn new() -> Self {
        Self {
            last: None,
            scale: DEFAULT_MOUSE_MOVE_SCALE,
            deadzone: DEFAULT_MOUSE_MOVE_DEADZONE,
        }
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Negative scales clamp to zero.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = if scale.is_nan() { 0.0 } else { scale.max(0.0) };
    }

    #[inline]
    pub fn deadzone(&self) -> i32 {
        self.deadzone
    }

    /// Negative deadzones clamp to zero.
    pub fn set_deadzone(&mut self, deadzone: i32) {
        self.deadzone = deadzone.max(0);
    }

    /// Forgets the baseline; the next sample only records a position.
    pub fn rebase(&mut self) {
        self.last = None;
    }

    /// Feeds the current cursor position. Returns the scaled delta when it
    /// clears the deadzone on either axis.
    pub fn sample(&mut self, pos: (i32, i32)) -> Option<(i32, i32)> {
        let Some((last_x, last_y)) = self.last else {
            self.last = Some(pos);
            return None;
        };
        let dx = pos.0.wrapping_sub(last_x);
        let dy = pos.1.wrapping_sub(last_y);
        if dx == 0 && dy == 0 {
            return None;
        }
        self.last = Some(pos);

        let sdx = scale_mouse_delta(dx, self.scale);
        let sdy = scale_mouse_delta(dy, self.scale);
        if sdx.abs() > self.deadzone || sdy.abs() > self.deadzone {
            Some((sdx, sdy))
        } else {
            None
        }
    }
}

impl Default for MouseMotion {
    fn default() -> Self {
        Self::new()
    }
}
