//! Angular rate to pointer and scroll deltas
//!
//! Axis mapping, looking at the remote held flat and pointing forward:
//!
//! | output  | gyro axis | sign     |
//! |---------|-----------|----------|
//! | pointer x | z (yaw)   | inverted |
//! | pointer y | x (pitch) | as is    |
//! | scroll    | y (roll)  | as is    |

use gyromouse_transport::GyroRate;

use crate::config::ShapingConfig;

/// Pointer delta in pixels per nominal sample interval
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionVector {
    pub x: f32,
    pub y: f32,
}

impl MotionVector {
    pub const ZERO: MotionVector = MotionVector { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scale(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Axis rates after the dead-zone, before the response curve
///
/// These drive gesture disambiguation, which compares magnitudes only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GatedAxes {
    pub pointer_x: f32,
    pub pointer_y: f32,
    pub scroll: f32,
}

/// Result of shaping one sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShapedMotion {
    pub gated: GatedAxes,
    pub pointer: MotionVector,
    /// Scroll in 1/120 notch units, not yet rounded
    pub scroll: f32,
}

impl ShapedMotion {
    /// Scroll amount as handed to the sink
    pub fn scroll_amount(&self) -> i32 {
        self.scroll.round() as i32
    }
}

/// Zero `value` when its magnitude is strictly below `threshold`
pub fn dead_zone(value: f32, threshold: f32) -> f32 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

/// `sign(v) * |v|^exponent / divisor`
pub fn power_curve(value: f32, exponent: f32, divisor: f32) -> f32 {
    value.signum() * value.abs().powf(exponent) / divisor
}

/// Dead-zone and response curve per axis
#[derive(Debug, Clone)]
pub struct MotionShaper {
    config: ShapingConfig,
}

impl MotionShaper {
    pub fn new(config: ShapingConfig) -> Self {
        Self { config }
    }

    pub fn shape(&self, gyro: &GyroRate) -> ShapedMotion {
        let c = &self.config;
        let gated = GatedAxes {
            pointer_x: dead_zone(gyro.z, c.pointer_dead_zone),
            pointer_y: dead_zone(gyro.x, c.pointer_dead_zone),
            scroll: dead_zone(gyro.y, c.scroll_dead_zone),
        };

        let curve = |v: f32, exponent: f32, divisor: f32| {
            if v == 0.0 {
                0.0
            } else {
                power_curve(v, exponent, divisor)
            }
        };

        ShapedMotion {
            gated,
            pointer: MotionVector {
                x: -curve(gated.pointer_x, c.pointer_exponent, c.pointer_divisor),
                y: curve(gated.pointer_y, c.pointer_exponent, c.pointer_divisor),
            },
            scroll: curve(gated.scroll, c.scroll_exponent, c.scroll_divisor),
        }
    }
}
