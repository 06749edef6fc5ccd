//! Velocity-hold extrapolation between samples
//!
//! Packets arrive roughly every 10 ms but with wireless jitter. Between
//! them, each tick moves the pointer by the last cooked delta scaled by the
//! time the tick covers, as if the last angular rate were still current.
//! Over one nominal interval the emitted deltas add up to the last cooked
//! delta.

use std::time::{Duration, Instant};

use crate::shaper::MotionVector;

/// Scale `delta` (per `nominal` interval) to cover `elapsed`
pub fn extrapolate(delta: MotionVector, elapsed: Duration, nominal: Duration) -> MotionVector {
    if nominal.is_zero() {
        return MotionVector::ZERO;
    }
    delta.scale(elapsed.as_secs_f32() / nominal.as_secs_f32())
}

/// Per-tick extrapolation state
#[derive(Debug, Clone)]
pub struct ExtrapolationScheduler {
    nominal_interval: Duration,
    max_hold: Duration,
    last_delta: MotionVector,
    /// Later of the last sample and the last tick
    mark: Option<Instant>,
}

impl ExtrapolationScheduler {
    pub fn new(nominal_interval: Duration, max_hold: Duration) -> Self {
        Self {
            nominal_interval,
            max_hold,
            last_delta: MotionVector::ZERO,
            mark: None,
        }
    }

    /// Replace the held velocity with a fresh sample's delta
    pub fn on_sample(&mut self, delta: MotionVector, now: Instant) {
        self.last_delta = delta;
        self.mark = Some(now);
    }

    /// Delta to emit for a tick at `now`
    ///
    /// Returns zero before the first sample.
    pub fn tick(&mut self, now: Instant) -> MotionVector {
        let Some(mark) = self.mark else {
            return MotionVector::ZERO;
        };
        let elapsed = now.saturating_duration_since(mark).min(self.max_hold);
        if now > mark {
            self.mark = Some(now);
        }
        extrapolate(self.last_delta, elapsed, self.nominal_interval)
    }

    pub fn last_delta(&self) -> MotionVector {
        self.last_delta
    }

    /// Drop the held velocity (link lost or misaligned)
    pub fn reset(&mut self) {
        self.last_delta = MotionVector::ZERO;
        self.mark = None;
    }
}
