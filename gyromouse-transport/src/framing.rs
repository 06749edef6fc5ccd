//! Frame synchronization and packet decoding
//!
//! The remote streams fixed-size packets with no start marker, so after a
//! (re)connect the host does not know where a packet begins. The
//! synchronizer keeps one counter per byte offset of the packet window and
//! counts how many consecutive windows showed the signature at that offset.
//! The first offset to reach the threshold is the last byte of a packet;
//! the next byte in the stream starts a new one.
//!
//! ```text
//! stream:  .. 3a 91 ff 02 00 10 7c a8 | 40 01 ...
//!                                  ^^
//!                        offset 7 counts up once per window
//! ```

use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::protocol::{has_valid_signature, RawPacket, Sample};

/// Finds the packet boundary in an unmarked byte stream
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    packet_size: usize,
    /// Consecutive valid windows required at one offset
    threshold: u32,
    /// Full windows scanned before giving up
    max_attempts: u32,
    /// Current offset inside the packet window
    cursor: usize,
    /// `valid_counts[i]` holds how many consecutive windows had the signature at offset i
    valid_counts: Vec<u32>,
    attempts: u32,
    aligned: bool,
}

impl FrameSynchronizer {
    /// Create a synchronizer for packets of `packet_size` bytes
    ///
    /// # Arguments
    /// * `threshold` - Consecutive valid packets at one offset before alignment is accepted
    /// * `max_attempts` - Failed full-window scans before alignment is abandoned
    pub fn new(packet_size: usize, threshold: u32, max_attempts: u32) -> Self {
        let packet_size = packet_size.max(1);
        Self {
            packet_size,
            threshold: threshold.max(1),
            max_attempts,
            cursor: 0,
            valid_counts: vec![0; packet_size],
            attempts: 0,
            aligned: false,
        }
    }

    /// Feed one byte while searching
    ///
    /// Returns `Ok(true)` on the byte that achieves alignment and `Ok(false)`
    /// otherwise. Bytes pushed while already aligned are ignored. Once the
    /// attempt budget is spent every call returns `AlignmentExhausted` until
    /// `reset()`.
    pub fn push_byte(&mut self, byte: u8) -> Result<bool, ProtocolError> {
        if self.aligned {
            return Ok(false);
        }
        if self.attempts >= self.max_attempts {
            return Err(ProtocolError::AlignmentExhausted {
                attempts: self.attempts,
            });
        }

        let count = &mut self.valid_counts[self.cursor];
        if has_valid_signature(byte) {
            *count += 1;
            if *count >= self.threshold {
                info!(
                    "Stream aligned at offset {} after {} windows",
                    self.cursor, self.attempts
                );
                self.clear_counters();
                self.aligned = true;
                return Ok(true);
            }
        } else {
            *count = 0;
        }

        self.cursor += 1;
        if self.cursor >= self.packet_size {
            self.cursor = 0;
            self.attempts += 1;
            if self.attempts >= self.max_attempts {
                warn!(
                    "Tried to align {} packet windows with no success",
                    self.attempts
                );
                return Err(ProtocolError::AlignmentExhausted {
                    attempts: self.attempts,
                });
            }
        }

        Ok(false)
    }

    /// Drop alignment and all scan progress
    pub fn reset(&mut self) {
        if self.aligned || self.attempts > 0 {
            debug!("Alignment state reset");
        }
        self.clear_counters();
        self.aligned = false;
    }

    fn clear_counters(&mut self) {
        self.cursor = 0;
        self.attempts = 0;
        self.valid_counts.iter_mut().for_each(|c| *c = 0);
    }

    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Full windows scanned since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Consecutive valid windows seen at `offset`
    pub fn valid_count(&self, offset: usize) -> u32 {
        self.valid_counts.get(offset).copied().unwrap_or(0)
    }

    /// True when no scan progress is held (fresh or just reset)
    pub fn is_pristine(&self) -> bool {
        !self.aligned
            && self.cursor == 0
            && self.attempts == 0
            && self.valid_counts.iter().all(|&c| c == 0)
    }
}

/// Decodes aligned packets into samples
#[derive(Debug, Clone, Copy)]
pub struct PacketDecoder {
    gyro_range_dps: f32,
}

impl PacketDecoder {
    pub fn new(gyro_range_dps: f32) -> Self {
        Self { gyro_range_dps }
    }

    /// Decode exactly one packet
    ///
    /// A signature failure drops the synchronizer back to searching (and
    /// clears its attempt budget) before the error is returned; no sample
    /// is produced from a packet that failed the check.
    pub fn decode(
        &self,
        block: &[u8],
        sync: &mut FrameSynchronizer,
    ) -> Result<Sample, ProtocolError> {
        if !sync.is_aligned() {
            return Err(ProtocolError::NotAligned);
        }
        if block.len() != sync.packet_size() {
            return Err(ProtocolError::PacketSizeMismatch {
                expected: sync.packet_size(),
                actual: block.len(),
            });
        }

        let packet = RawPacket::from_bytes(block)?;
        if !packet.has_valid_signature() {
            warn!(
                "Data misaligned (button byte 0x{:02X}), restarting scan",
                packet.button_byte
            );
            sync.reset();
            return Err(ProtocolError::SignatureViolation {
                byte: packet.button_byte,
            });
        }

        Ok(packet.to_sample(self.gyro_range_dps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_packet, Buttons, PACKET_SIZE, SIGNATURE};

    fn packet(gyro: [i16; 3]) -> [u8; PACKET_SIZE] {
        encode_packet(gyro, Buttons::default())
    }

    /// Bytes that never carry the signature
    fn noise(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 0xA0) as u8).collect()
    }

    fn feed(sync: &mut FrameSynchronizer, bytes: &[u8]) -> Option<Result<usize, ProtocolError>> {
        for (i, &b) in bytes.iter().enumerate() {
            match sync.push_byte(b) {
                Ok(true) => return Some(Ok(i + 1)),
                Ok(false) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    #[test]
    fn test_aligns_on_first_packet_boundary() {
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 5, 300);
        let stream: Vec<u8> = (0..10).flat_map(|_| packet([1, 2, 3])).collect();

        let consumed = feed(&mut sync, &stream).unwrap().unwrap();
        assert_eq!(consumed, 5 * PACKET_SIZE);
        assert!(sync.is_aligned());
    }

    #[test]
    fn test_aligns_at_unknown_offset() {
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 5, 300);
        // Three bytes of a torn packet before the real stream starts
        let mut stream = vec![0x11, 0x22, 0x33];
        stream.extend((0..10).flat_map(|_| packet([7, -7, 100])));

        let consumed = feed(&mut sync, &stream).unwrap().unwrap();
        assert_eq!(consumed, 3 + 5 * PACKET_SIZE);
        assert!(consumed <= 5 * PACKET_SIZE + PACKET_SIZE);
    }

    #[test]
    fn test_not_before_threshold() {
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 5, 300);
        let stream: Vec<u8> = (0..4).flat_map(|_| packet([0, 0, 0])).collect();
        assert!(feed(&mut sync, &stream).is_none());
        assert!(!sync.is_aligned());
        assert_eq!(sync.valid_count(PACKET_SIZE - 1), 4);
    }

    #[test]
    fn test_mismatch_resets_offset_counter() {
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 3, 300);
        let mut stream: Vec<u8> = (0..2).flat_map(|_| packet([0, 0, 0])).collect();
        let mut broken = packet([0, 0, 0]);
        broken[PACKET_SIZE - 1] = 0x00;
        stream.extend_from_slice(&broken);
        assert!(feed(&mut sync, &stream).is_none());
        assert_eq!(sync.valid_count(PACKET_SIZE - 1), 0);

        let again: Vec<u8> = (0..3).flat_map(|_| packet([0, 0, 0])).collect();
        assert_eq!(feed(&mut sync, &again).unwrap().unwrap(), 3 * PACKET_SIZE);
    }

    #[test]
    fn test_exhausted_exactly_at_ceiling() {
        let ceiling = 12;
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 5, ceiling);
        let stream = noise(ceiling as usize * PACKET_SIZE);

        for &b in &stream[..stream.len() - 1] {
            assert_eq!(sync.push_byte(b), Ok(false));
        }
        assert_eq!(
            sync.push_byte(stream[stream.len() - 1]),
            Err(ProtocolError::AlignmentExhausted { attempts: ceiling })
        );
        // Sticky until reset
        assert!(sync.push_byte(SIGNATURE).is_err());
        sync.reset();
        assert!(sync.is_pristine());
        assert_eq!(sync.push_byte(0), Ok(false));
    }

    #[test]
    fn test_decode_requires_alignment() {
        let decoder = PacketDecoder::new(500.0);
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 1, 10);
        assert_eq!(
            decoder.decode(&packet([0, 0, 0]), &mut sync),
            Err(ProtocolError::NotAligned)
        );
    }

    #[test]
    fn test_decode_is_deterministic() {
        let decoder = PacketDecoder::new(500.0);
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 1, 10);
        assert_eq!(sync.push_byte(SIGNATURE), Ok(true));

        let block = packet([1234, -4321, 32000]);
        let a = decoder.decode(&block, &mut sync).unwrap();
        let b = decoder.decode(&block, &mut sync).unwrap();
        assert_eq!(a, b);
        assert!(sync.is_aligned());
    }

    #[test]
    fn test_decode_rejects_wrong_length_without_dropping_alignment() {
        let decoder = PacketDecoder::new(500.0);
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 1, 10);
        sync.push_byte(SIGNATURE).unwrap();

        let err = decoder.decode(&[SIGNATURE; 5], &mut sync).unwrap_err();
        assert!(matches!(err, ProtocolError::PacketSizeMismatch { actual: 5, .. }));
        assert!(sync.is_aligned());
    }

    #[test]
    fn test_signature_violation_drops_alignment() {
        let decoder = PacketDecoder::new(500.0);
        let mut sync = FrameSynchronizer::new(PACKET_SIZE, 1, 10);
        sync.push_byte(SIGNATURE).unwrap();

        let mut block = packet([5, 5, 5]);
        block[PACKET_SIZE - 1] = 0x13;
        assert_eq!(
            decoder.decode(&block, &mut sync),
            Err(ProtocolError::SignatureViolation { byte: 0x13 })
        );
        assert!(!sync.is_aligned());
        assert!(sync.is_pristine());
    }
}
