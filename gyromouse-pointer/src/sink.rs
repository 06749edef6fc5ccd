//! Pointer sink abstraction
//!
//! The pipeline drives the host pointer only through `PointerSink`. Calls
//! are fire-and-forget: a failed call is logged by the caller and never
//! rolls back pipeline state.

use thiserror::Error;
use tracing::debug;

/// Errors from pointer injection
#[derive(Debug, Error)]
pub enum PointerError {
    #[error("Failed to create virtual device: {0}")]
    CreateDevice(#[source] std::io::Error),
    #[error("Failed to emit event: {0}")]
    EmitEvent(#[source] std::io::Error),
    #[error("Not supported by this sink: {0}")]
    Unsupported(&'static str),
}

/// Physical buttons the remote can press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

impl PointerButton {
    pub const ALL: [PointerButton; 3] = [
        PointerButton::Left,
        PointerButton::Right,
        PointerButton::Middle,
    ];

    pub fn index(self) -> usize {
        match self {
            PointerButton::Left => 0,
            PointerButton::Right => 1,
            PointerButton::Middle => 2,
        }
    }
}

/// Host pointer injection
pub trait PointerSink: Send {
    /// Move by a relative amount in pixels; fractions accumulate
    fn move_pointer(&mut self, dx: f32, dy: f32) -> Result<(), PointerError>;

    /// Press or release a button; repeating the current state is a no-op
    fn set_button(&mut self, button: PointerButton, pressed: bool) -> Result<(), PointerError>;

    /// Scroll by `amount` in 1/120 notch units, positive away from the user
    fn scroll(&mut self, amount: i32) -> Result<(), PointerError>;

    /// Touch contact on the alternate injection path
    fn set_touch(&mut self, _pressed: bool) -> Result<(), PointerError> {
        Err(PointerError::Unsupported("touch"))
    }
}

/// Sink that only logs, for dry runs
#[derive(Debug, Default)]
pub struct LoggingSink {
    buttons: [bool; 3],
    touch: bool,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PointerSink for LoggingSink {
    fn move_pointer(&mut self, dx: f32, dy: f32) -> Result<(), PointerError> {
        debug!("move ({:.3}, {:.3})", dx, dy);
        Ok(())
    }

    fn set_button(&mut self, button: PointerButton, pressed: bool) -> Result<(), PointerError> {
        let slot = &mut self.buttons[button.index()];
        if *slot != pressed {
            *slot = pressed;
            debug!("{:?} {}", button, if pressed { "down" } else { "up" });
        }
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<(), PointerError> {
        debug!("scroll {}", amount);
        Ok(())
    }

    fn set_touch(&mut self, pressed: bool) -> Result<(), PointerError> {
        if self.touch != pressed {
            self.touch = pressed;
            debug!("touch {}", if pressed { "down" } else { "up" });
        }
        Ok(())
    }
}
