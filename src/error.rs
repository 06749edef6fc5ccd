//! Pipeline error types

use gyromouse_transport::{ProtocolError, TransportError};
use thiserror::Error;

/// Conditions that end a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transport gave up reconnecting
    #[error("Link failed: {0}")]
    LinkFailed(String),

    #[error("Failed to start tick thread: {0}")]
    Ticker(#[source] std::io::Error),
}
