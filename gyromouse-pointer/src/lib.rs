//! Host pointer injection for the gyromouse remote
//!
//! Turns pipeline output (fractional moves, button edges, hi-res scroll)
//! into events on a uinput virtual mouse.

pub mod cursor;
pub mod sink;
pub mod virtual_pointer;

pub use cursor::{CursorTracker, ScreenBounds, WheelAccumulator, WHEEL_UNITS_PER_NOTCH};
pub use sink::{LoggingSink, PointerButton, PointerError, PointerSink};
pub use virtual_pointer::VirtualPointer;
