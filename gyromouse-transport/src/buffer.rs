//! Bounded byte buffering between the link and the pipeline
//!
//! `ByteBuffer` is a fixed-capacity FIFO that drops its oldest bytes on
//! overflow. `SharedBuffer` wraps it for the reader-thread / consumer split
//! and provides the blocking single-byte read.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::TransportError;

/// Default buffer capacity in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Fixed-capacity byte FIFO
#[derive(Debug)]
pub struct ByteBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    dropped: u64,
}

impl ByteBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append bytes, evicting the oldest on overflow
    ///
    /// Returns how many bytes were evicted by this call.
    pub fn push_slice(&mut self, data: &[u8]) -> usize {
        let mut evicted = 0;
        for &b in data {
            if self.bytes.len() == self.capacity {
                self.bytes.pop_front();
                evicted += 1;
            }
            self.bytes.push_back(b);
        }
        self.dropped += evicted as u64;
        evicted
    }

    pub fn pop_byte(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    /// Remove exactly `count` bytes, or nothing if fewer are buffered
    pub fn take_exact(&mut self, count: usize) -> Result<Vec<u8>, TransportError> {
        if count > self.bytes.len() {
            return Err(TransportError::InsufficientData {
                requested: count,
                available: self.bytes.len(),
            });
        }
        Ok(self.bytes.drain(..count).collect())
    }

    /// Drop up to `count` of the oldest bytes
    pub fn discard(&mut self, count: usize) -> usize {
        let n = count.min(self.bytes.len());
        self.bytes.drain(..n);
        n
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes evicted by overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

struct SharedState {
    bytes: ByteBuffer,
    /// Set while the link is down; blocked readers wake with `Disconnected`
    closed: bool,
}

/// `ByteBuffer` shared between a producer thread and the consumer
pub(crate) struct SharedBuffer {
    state: Mutex<SharedState>,
    ready: Condvar,
}

impl SharedBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SharedState {
                bytes: ByteBuffer::new(capacity),
                closed: true,
            }),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn push(&self, data: &[u8]) {
        let mut state = self.state.lock();
        let evicted = state.bytes.push_slice(data);
        if evicted > 0 {
            trace!("Byte buffer overflow, evicted {} bytes", evicted);
        }
        drop(state);
        self.ready.notify_all();
    }

    /// Blocks until a byte is available or the link closes
    pub(crate) fn read_byte(&self) -> Result<u8, TransportError> {
        let mut state = self.state.lock();
        loop {
            if let Some(b) = state.bytes.pop_byte() {
                return Ok(b);
            }
            if state.closed {
                return Err(TransportError::Disconnected);
            }
            self.ready.wait(&mut state);
        }
    }

    pub(crate) fn read_exact(&self, count: usize) -> Result<Vec<u8>, TransportError> {
        self.state.lock().bytes.take_exact(count)
    }

    pub(crate) fn available(&self) -> usize {
        self.state.lock().bytes.len()
    }

    pub(crate) fn discard(&self, count: usize) -> usize {
        self.state.lock().bytes.discard(count)
    }

    /// Clear stale bytes and accept data again
    pub(crate) fn open(&self) {
        let mut state = self.state.lock();
        state.bytes.clear();
        state.closed = false;
    }

    /// Drop buffered bytes and wake blocked readers
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.bytes.clear();
        state.closed = true;
        drop(state);
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_overflow_drops_oldest() {
        let mut buf = ByteBuffer::new(4);
        assert_eq!(buf.push_slice(&[1, 2, 3]), 0);
        assert_eq!(buf.push_slice(&[4, 5, 6]), 2);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.dropped(), 2);
        assert_eq!(buf.pop_byte(), Some(3));
    }

    #[test]
    fn test_take_exact_fails_fast() {
        let mut buf = ByteBuffer::new(16);
        buf.push_slice(&[1, 2, 3]);
        match buf.take_exact(4) {
            Err(TransportError::InsufficientData {
                requested,
                available,
            }) => {
                assert_eq!(requested, 4);
                assert_eq!(available, 3);
            }
            other => panic!("Expected InsufficientData, got {:?}", other),
        }
        // Nothing consumed by the failed read
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.take_exact(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_discard() {
        let mut buf = ByteBuffer::new(16);
        buf.push_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.discard(2), 2);
        assert_eq!(buf.pop_byte(), Some(3));
        assert_eq!(buf.discard(10), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_blocking_read_wakes_on_push() {
        let shared = Arc::new(SharedBuffer::new(16));
        shared.open();

        let reader = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || shared.read_byte())
        };
        std::thread::sleep(Duration::from_millis(20));
        shared.push(&[0x42]);

        assert_eq!(reader.join().unwrap().unwrap(), 0x42);
    }

    #[test]
    fn test_blocking_read_wakes_on_close() {
        let shared = Arc::new(SharedBuffer::new(16));
        shared.open();

        let reader = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || shared.read_byte())
        };
        std::thread::sleep(Duration::from_millis(20));
        shared.close();

        assert!(matches!(
            reader.join().unwrap(),
            Err(TransportError::Disconnected)
        ));
    }
}
