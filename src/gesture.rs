//! Middle-button gesture disambiguation
//!
//! Holding the middle button either scrolls or drags. Which one is decided
//! by the first clear motion after the press: a roll past the scroll
//! tolerance commits to scrolling, a yaw or pitch past the drag tolerance
//! commits to dragging. Scroll is checked first, so a sample that breaches
//! both commits to scrolling.

use tracing::debug;

use crate::config::GestureConfig;
use crate::shaper::GatedAxes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    Undetermined,
    Scroll,
    Drag,
}

impl GesturePhase {
    /// Pointer motion is not applied while scrolling
    pub fn suppresses_pointer(&self) -> bool {
        matches!(self, GesturePhase::Scroll)
    }
}

#[derive(Debug, Clone)]
pub struct GestureStateMachine {
    phase: GesturePhase,
    middle_held: bool,
    scroll_tolerance: f32,
    drag_tolerance: f32,
}

impl GestureStateMachine {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            phase: GesturePhase::Idle,
            middle_held: false,
            scroll_tolerance: config.scroll_tolerance,
            drag_tolerance: config.drag_tolerance,
        }
    }

    /// Advance with one sample and return the resulting phase
    ///
    /// The press edge is handled before resolution, so a sample that both
    /// presses the button and moves past a tolerance resolves at once.
    pub fn update(&mut self, middle_pressed: bool, axes: &GatedAxes) -> GesturePhase {
        let previous = self.phase;

        if !middle_pressed {
            self.middle_held = false;
            self.phase = GesturePhase::Idle;
        } else {
            if !self.middle_held {
                self.middle_held = true;
                self.phase = GesturePhase::Undetermined;
            }
            if self.phase == GesturePhase::Undetermined {
                if axes.scroll.abs() > self.scroll_tolerance {
                    self.phase = GesturePhase::Scroll;
                } else if axes.pointer_x.abs() > self.drag_tolerance
                    || axes.pointer_y.abs() > self.drag_tolerance
                {
                    self.phase = GesturePhase::Drag;
                }
            }
        }

        if self.phase != previous {
            debug!("Gesture {:?} -> {:?}", previous, self.phase);
        }
        self.phase
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    /// Forget any held press (link lost)
    pub fn reset(&mut self) {
        self.middle_held = false;
        self.phase = GesturePhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> GestureStateMachine {
        GestureStateMachine::new(&GestureConfig::default())
    }

    fn axes(pointer_x: f32, pointer_y: f32, scroll: f32) -> GatedAxes {
        GatedAxes {
            pointer_x,
            pointer_y,
            scroll,
        }
    }

    #[test]
    fn test_press_enters_undetermined() {
        let mut gm = machine();
        assert_eq!(gm.update(false, &axes(0.0, 0.0, 0.0)), GesturePhase::Idle);
        assert_eq!(gm.update(true, &axes(0.0, 0.0, 0.0)), GesturePhase::Undetermined);
        assert_eq!(gm.update(true, &axes(5.0, 5.0, 5.0)), GesturePhase::Undetermined);
    }

    #[test]
    fn test_scroll_resolution() {
        let mut gm = machine();
        gm.update(true, &axes(0.0, 0.0, 0.0));
        assert_eq!(gm.update(true, &axes(0.0, 0.0, -26.0)), GesturePhase::Scroll);
        // Committed: later drag-sized motion does not change it
        assert_eq!(gm.update(true, &axes(100.0, 0.0, 0.0)), GesturePhase::Scroll);
    }

    #[test]
    fn test_drag_resolution() {
        let mut gm = machine();
        gm.update(true, &axes(0.0, 0.0, 0.0));
        assert_eq!(gm.update(true, &axes(0.0, 21.0, 0.0)), GesturePhase::Drag);
        assert_eq!(gm.update(true, &axes(0.0, 0.0, 100.0)), GesturePhase::Drag);
    }

    #[test]
    fn test_tolerance_is_exclusive() {
        let mut gm = machine();
        gm.update(true, &axes(0.0, 0.0, 0.0));
        assert_eq!(gm.update(true, &axes(20.0, 0.0, 25.0)), GesturePhase::Undetermined);
    }

    #[test]
    fn test_simultaneous_breach_prefers_scroll() {
        let mut gm = machine();
        gm.update(true, &axes(0.0, 0.0, 0.0));
        assert_eq!(gm.update(true, &axes(50.0, 50.0, 50.0)), GesturePhase::Scroll);
    }

    #[test]
    fn test_rising_edge_resolves_same_sample() {
        let mut gm = machine();
        assert_eq!(gm.update(true, &axes(0.0, 0.0, 40.0)), GesturePhase::Scroll);
    }

    #[test]
    fn test_release_always_idles() {
        for motion in [axes(0.0, 0.0, 0.0), axes(0.0, 0.0, 40.0), axes(40.0, 0.0, 0.0)] {
            let mut gm = machine();
            gm.update(true, &axes(0.0, 0.0, 0.0));
            gm.update(true, &motion);
            assert_eq!(gm.update(false, &motion), GesturePhase::Idle);
        }
    }

    #[test]
    fn test_sustained_press_is_not_an_edge() {
        let mut gm = machine();
        gm.update(true, &axes(0.0, 0.0, 40.0));
        assert_eq!(gm.phase(), GesturePhase::Scroll);
        // Holding does not re-enter Undetermined
        gm.update(true, &axes(0.0, 0.0, 0.0));
        assert_eq!(gm.phase(), GesturePhase::Scroll);
        gm.update(false, &axes(0.0, 0.0, 0.0));
        assert_eq!(gm.update(true, &axes(0.0, 0.0, 0.0)), GesturePhase::Undetermined);
    }

    #[test]
    fn test_reset() {
        let mut gm = machine();
        gm.update(true, &axes(0.0, 0.0, 40.0));
        gm.reset();
        assert_eq!(gm.phase(), GesturePhase::Idle);
        assert_eq!(gm.update(true, &axes(0.0, 0.0, 0.0)), GesturePhase::Undetermined);
    }
}
