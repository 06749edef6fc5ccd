//! Gyroscope remote to pointer driver
//!
//! Turns the angular-rate stream of a handheld gyro remote into smooth
//! pointer motion, clicks and scrolling:
//!
//! ```text
//! bytes -> FrameSynchronizer -> PacketDecoder -> Sample
//!       -> MotionShaper + GestureStateMachine -> Pipeline -> PointerSink
//!                            ExtrapolationScheduler (1 ms ticks) --^
//! ```

pub mod config;
pub mod error;
pub mod extrapolation;
pub mod gesture;
pub mod orchestrator;
pub mod shaper;
pub mod ticker;
pub mod watchdog;

pub use config::{ConfigError, GyromouseConfig};
pub use error::PipelineError;
pub use extrapolation::{extrapolate, ExtrapolationScheduler};
pub use gesture::{GesturePhase, GestureStateMachine};
pub use orchestrator::{ConnectionPhase, Pipeline, PipelineEvent, PipelineStats};
pub use shaper::{MotionShaper, MotionVector, ShapedMotion};
pub use ticker::{PeriodicScheduler, ThreadScheduler, TickCallback, TickHandle};
pub use watchdog::{ConnectionWatchdog, WatchdogStatus};
