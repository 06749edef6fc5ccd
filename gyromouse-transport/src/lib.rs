//! Transport layer for the gyromouse remote
//!
//! This crate gets raw bytes from the remote to the pointer pipeline:
//!
//! - RFCOMM / serial tty transport with a dedicated link worker thread
//! - In-memory transport for replaying captures and for tests
//! - Packet wire format, frame synchronization and packet decoding

pub mod buffer;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod types;

mod memory;
mod tty;

pub use buffer::{ByteBuffer, DEFAULT_BUFFER_CAPACITY};
pub use error::{ProtocolError, TransportError};
pub use framing::{FrameSynchronizer, PacketDecoder};
pub use memory::MemoryTransport;
pub use protocol::{encode_packet, Buttons, GyroRate, RawPacket, Sample, PACKET_SIZE};
pub use tty::{TtyConfig, TtyTransport};
pub use types::{TransportDeviceInfo, TransportType};

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Receives link notifications from a transport
///
/// A transport has at most one observer. Callbacks run on the transport's
/// own thread (or the caller's, for in-memory feeds) and must return
/// promptly.
pub trait LinkObserver: Send + Sync {
    /// The link is up and the buffer has been cleared
    fn on_connected(&self);

    /// The link dropped without being asked to
    fn on_disconnected(&self);

    /// New bytes were appended to the buffer
    fn on_data(&self);

    /// The transport gave up; no further connection attempts will be made
    fn on_link_failed(&self, error: &TransportError);
}

/// A push-based byte stream from the remote
///
/// Reads are served from an internal bounded buffer. `read_byte` blocks
/// until a byte arrives or the link closes; `read_bytes` never blocks and
/// fails if fewer than `count` bytes are buffered.
pub trait ByteSource: Send + Sync {
    /// Register the observer; replaces any previous one
    fn set_observer(&self, observer: Weak<dyn LinkObserver>);

    /// Start connecting; completion is reported through `on_connected`
    fn connect(&self) -> Result<(), TransportError>;

    /// Drop the current link and connect again
    fn request_reconnect(&self);

    /// Stop all activity and release the device
    fn close(&self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Number of buffered bytes
    fn bytes_available(&self) -> usize;

    /// Blocking single-byte read
    fn read_byte(&self) -> Result<u8, TransportError>;

    /// Fail-fast multi-byte read
    fn read_bytes(&self, count: usize) -> Result<Vec<u8>, TransportError>;

    /// Drop up to `count` of the oldest buffered bytes
    fn discard(&self, count: usize) -> usize;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;
}

/// Type alias for a shared byte source
pub type BoxedByteSource = Arc<dyn ByteSource>;

/// Holds the weak observer reference for a transport
#[derive(Default)]
pub(crate) struct ObserverSlot {
    observer: Mutex<Option<Weak<dyn LinkObserver>>>,
}

impl ObserverSlot {
    pub(crate) fn set(&self, observer: Weak<dyn LinkObserver>) {
        *self.observer.lock() = Some(observer);
    }

    /// Run `f` against the observer if it is still alive
    ///
    /// The slot lock is released before the callback runs.
    pub(crate) fn notify(&self, f: impl FnOnce(&dyn LinkObserver)) {
        let observer = self.observer.lock().as_ref().and_then(Weak::upgrade);
        if let Some(observer) = observer {
            f(observer.as_ref());
        }
    }
}
