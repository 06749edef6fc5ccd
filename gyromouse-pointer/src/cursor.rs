//! Sub-pixel cursor and wheel bookkeeping
//!
//! uinput only takes integer relative steps, while the pipeline emits
//! fractional deltas every millisecond. The tracker carries the sub-pixel
//! remainder between calls and keeps an estimate of the cursor position.
//!
//! A relative device cannot read back where the host cursor is, so the
//! estimate starts at the screen centre and may drift from the real
//! cursor. Steps are never withheld because of the estimate: the
//! compositor clamps the real cursor at its own screen edges.

/// Screen size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenBounds {
    pub width: u32,
    pub height: u32,
}

impl ScreenBounds {
    fn max_x(&self) -> f32 {
        self.width.saturating_sub(1) as f32
    }

    fn max_y(&self) -> f32 {
        self.height.saturating_sub(1) as f32
    }
}

impl Default for ScreenBounds {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Sub-pixel step accumulator with a screen-clamped position estimate
#[derive(Debug, Clone)]
pub struct CursorTracker {
    bounds: ScreenBounds,
    x: f32,
    y: f32,
    /// Motion not yet handed out as whole pixels
    residual_x: f32,
    residual_y: f32,
}

impl CursorTracker {
    /// Start at the centre of the screen
    pub fn new(bounds: ScreenBounds) -> Self {
        Self {
            bounds,
            x: (bounds.max_x() / 2.0).round(),
            y: (bounds.max_y() / 2.0).round(),
            residual_x: 0.0,
            residual_y: 0.0,
        }
    }

    /// Apply a delta and return the integer step to emit
    pub fn advance(&mut self, dx: f32, dy: f32) -> (i32, i32) {
        self.x = (self.x + dx).clamp(0.0, self.bounds.max_x());
        self.y = (self.y + dy).clamp(0.0, self.bounds.max_y());

        self.residual_x += dx;
        self.residual_y += dy;
        let step_x = self.residual_x.round();
        let step_y = self.residual_y.round();
        self.residual_x -= step_x;
        self.residual_y -= step_y;
        (step_x as i32, step_y as i32)
    }

    /// Estimated position; only as good as the starting guess
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// Hi-res wheel units per detent
pub const WHEEL_UNITS_PER_NOTCH: i32 = 120;

/// Splits hi-res scroll into whole detents for legacy consumers
#[derive(Debug, Clone, Default)]
pub struct WheelAccumulator {
    remainder: i32,
}

impl WheelAccumulator {
    /// Add hi-res units; returns whole notches completed
    pub fn add(&mut self, units: i32) -> i32 {
        self.remainder += units;
        let notches = self.remainder / WHEEL_UNITS_PER_NOTCH;
        self.remainder -= notches * WHEEL_UNITS_PER_NOTCH;
        notches
    }
}
