//! In-process byte feed
//!
//! Bytes handed to `feed()` are buffered and announced to the observer on
//! the calling thread, exactly as the tty worker would. Reconnect requests
//! are only counted; the owner decides when to `connect()` again.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Weak;

use tracing::{debug, info};

use crate::buffer::SharedBuffer;
use crate::error::TransportError;
use crate::types::{TransportDeviceInfo, TransportType};
use crate::{ByteSource, LinkObserver, ObserverSlot, DEFAULT_BUFFER_CAPACITY};

/// Transport fed from memory (replay files, tests)
pub struct MemoryTransport {
    info: TransportDeviceInfo,
    buffer: SharedBuffer,
    observer: ObserverSlot,
    connected: AtomicBool,
    reconnect_requests: AtomicU32,
}

impl MemoryTransport {
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(name: &str, capacity: usize) -> Self {
        Self {
            info: TransportDeviceInfo {
                transport_type: TransportType::Memory,
                device_path: format!("memory:{name}"),
                name: Some(name.to_string()),
            },
            buffer: SharedBuffer::new(capacity),
            observer: ObserverSlot::default(),
            connected: AtomicBool::new(false),
            reconnect_requests: AtomicU32::new(0),
        }
    }

    /// Deliver bytes as if they had arrived over the link
    ///
    /// Returns false (and drops the bytes) while disconnected.
    pub fn feed(&self, bytes: &[u8]) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            debug!("Dropping {} bytes fed while disconnected", bytes.len());
            return false;
        }
        self.buffer.push(bytes);
        self.observer.notify(|o| o.on_data());
        true
    }

    /// Simulate the remote dropping the link
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.buffer.close();
            self.observer.notify(|o| o.on_disconnected());
        }
    }

    /// How many times a reconnect has been requested
    pub fn reconnect_requests(&self) -> u32 {
        self.reconnect_requests.load(Ordering::SeqCst)
    }
}

impl ByteSource for MemoryTransport {
    fn set_observer(&self, observer: Weak<dyn LinkObserver>) {
        self.observer.set(observer);
    }

    fn connect(&self) -> Result<(), TransportError> {
        self.buffer.open();
        self.connected.store(true, Ordering::SeqCst);
        info!("Connected to {}", self.info.display_name());
        self.observer.notify(|o| o.on_connected());
        Ok(())
    }

    fn request_reconnect(&self) {
        self.reconnect_requests.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.buffer.close();
    }

    fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.buffer.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn bytes_available(&self) -> usize {
        self.buffer.available()
    }

    fn read_byte(&self) -> Result<u8, TransportError> {
        self.buffer.read_byte()
    }

    fn read_bytes(&self, count: usize) -> Result<Vec<u8>, TransportError> {
        self.buffer.read_exact(count)
    }

    fn discard(&self, count: usize) -> usize {
        self.buffer.discard(count)
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingObserver {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
        data: AtomicUsize,
    }

    impl LinkObserver for CountingObserver {
        fn on_connected(&self) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_disconnected(&self) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_data(&self) {
            self.data.fetch_add(1, Ordering::SeqCst);
        }
        fn on_link_failed(&self, _error: &TransportError) {}
    }

    #[test]
    fn test_feed_requires_connection() {
        let transport = MemoryTransport::new("test");
        assert!(!transport.feed(&[1, 2, 3]));
        assert_eq!(transport.bytes_available(), 0);

        transport.connect().unwrap();
        assert!(transport.feed(&[1, 2, 3]));
        assert_eq!(transport.bytes_available(), 3);
        assert_eq!(transport.read_byte().unwrap(), 1);
        assert!(transport.read_bytes(3).is_err());
        assert_eq!(transport.read_bytes(2).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_observer_notifications() {
        let transport = MemoryTransport::new("test");
        let observer = Arc::new(CountingObserver::default());
        let weak: Weak<dyn LinkObserver> = Arc::downgrade(&observer) as Weak<dyn LinkObserver>;
        transport.set_observer(weak);

        transport.connect().unwrap();
        transport.feed(&[0xA8]);
        transport.feed(&[0xA8]);
        transport.disconnect();
        transport.disconnect();

        assert_eq!(observer.connected.load(Ordering::SeqCst), 1);
        assert_eq!(observer.data.load(Ordering::SeqCst), 2);
        assert_eq!(observer.disconnected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconnect_request_clears_buffer() {
        let transport = MemoryTransport::new("test");
        transport.connect().unwrap();
        transport.feed(&[1, 2, 3, 4]);
        transport.request_reconnect();

        assert_eq!(transport.reconnect_requests(), 1);
        assert!(!transport.is_connected());
        assert_eq!(transport.bytes_available(), 0);
        assert!(matches!(
            transport.read_byte(),
            Err(TransportError::Disconnected)
        ));
    }
}
