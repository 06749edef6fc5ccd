//! Transport and protocol error types

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    /// Multi-byte reads fail fast instead of returning a short read
    #[error("Not enough buffered data: requested {requested} bytes, {available} available")]
    InsufficientData { requested: usize, available: usize },

    #[error("Gave up connecting after {0} attempts")]
    RetriesExhausted(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<nix::Error> for TransportError {
    fn from(e: nix::Error) -> Self {
        TransportError::Io(std::io::Error::from(e))
    }
}

/// Errors from frame synchronization and packet decoding
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Decode was attempted before the frame boundary was found
    #[error("Stream is not aligned")]
    NotAligned,

    /// Caller handed the decoder a block of the wrong length
    #[error("Packet size mismatch: expected {expected} bytes, got {actual}")]
    PacketSizeMismatch { expected: usize, actual: usize },

    /// An aligned packet failed the signature check in its last byte
    #[error("Signature violation on aligned packet (button byte 0x{byte:02X})")]
    SignatureViolation { byte: u8 },

    /// The synchronizer scanned its full attempt budget without locking on
    #[error("Alignment exhausted after {attempts} packet windows")]
    AlignmentExhausted { attempts: u32 },
}

impl ProtocolError {
    /// Whether the run cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::AlignmentExhausted { .. })
    }
}
