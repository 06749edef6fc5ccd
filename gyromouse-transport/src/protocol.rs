//! Wire format of the remote's motion packets
//!
//! Every packet is a fixed-size little-endian record:
//!
//! ```text
//! offset  size  field
//!   0      2    gyro X (i16)
//!   2      2    gyro Y (i16)
//!   4      2    gyro Z (i16)
//!   6      1    reserved (ignored downstream)
//!   7      1    bit 0 right, bit 1 left, bit 2 middle, bits 3-7 signature
//! ```
//!
//! The stream carries no other framing. The signature in the high bits of
//! the last byte is what the frame synchronizer scans for, and it is
//! re-checked on every packet once streaming.

use crate::error::ProtocolError;

/// Size of one packet on the wire
pub const PACKET_SIZE: usize = 8;

/// Byte offsets inside a packet
pub mod offset {
    pub const GYRO_X: usize = 0;
    pub const GYRO_Y: usize = 2;
    pub const GYRO_Z: usize = 4;
    pub const RESERVED: usize = 6;
    pub const BUTTONS: usize = 7;
}

/// Constant pattern in the upper 5 bits of the button byte
pub const SIGNATURE: u8 = 0b1010_1000;
/// Mask selecting the signature bits
pub const SIGNATURE_MASK: u8 = 0b1111_1000;

/// Button bits in the low 3 bits of the button byte
pub mod button {
    pub const RIGHT: u8 = 0x01;
    pub const LEFT: u8 = 0x02;
    pub const MIDDLE: u8 = 0x04;
    pub const MASK: u8 = 0x07;
}

/// Largest raw gyro magnitude, mapped to the configured full-scale range
pub const GYRO_FULL_SCALE: f32 = i16::MAX as f32;

/// Check the upper 5 bits of a byte against the signature
#[inline]
pub fn has_valid_signature(byte: u8) -> bool {
    byte & SIGNATURE_MASK == SIGNATURE
}

/// Scale a raw gyro reading to degrees per second
///
/// Linear and sign-preserving: `raw * range / i16::MAX`.
#[inline]
pub fn scale_gyro(raw: i16, range_dps: f32) -> f32 {
    raw as f32 * range_dps / GYRO_FULL_SCALE
}

/// Button state carried in a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons {
    pub right: bool,
    pub left: bool,
    pub middle: bool,
}

impl Buttons {
    /// Decode the low 3 bits of a button byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            right: byte & button::RIGHT != 0,
            left: byte & button::LEFT != 0,
            middle: byte & button::MIDDLE != 0,
        }
    }

    /// Encode back into the low 3 bits
    pub fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.right {
            bits |= button::RIGHT;
        }
        if self.left {
            bits |= button::LEFT;
        }
        if self.middle {
            bits |= button::MIDDLE;
        }
        bits
    }
}

/// Angular rate per axis in degrees per second
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroRate {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One decoded packet
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub gyro: GyroRate,
    pub buttons: Buttons,
}

/// Field-level view of one packet, before scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket {
    pub gyro: [i16; 3],
    pub reserved: u8,
    pub button_byte: u8,
}

impl RawPacket {
    /// Parse a packet from exactly `PACKET_SIZE` bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != PACKET_SIZE {
            return Err(ProtocolError::PacketSizeMismatch {
                expected: PACKET_SIZE,
                actual: bytes.len(),
            });
        }

        let read_i16 = |at: usize| i16::from_le_bytes([bytes[at], bytes[at + 1]]);
        Ok(Self {
            gyro: [
                read_i16(offset::GYRO_X),
                read_i16(offset::GYRO_Y),
                read_i16(offset::GYRO_Z),
            ],
            reserved: bytes[offset::RESERVED],
            button_byte: bytes[offset::BUTTONS],
        })
    }

    /// Build a well-formed packet (signature set) from gyro values and buttons
    pub fn new(gyro: [i16; 3], buttons: Buttons) -> Self {
        Self {
            gyro,
            reserved: 0,
            button_byte: SIGNATURE | buttons.to_bits(),
        }
    }

    /// Serialize to wire bytes
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        for (i, value) in self.gyro.iter().enumerate() {
            let at = offset::GYRO_X + i * 2;
            out[at..at + 2].copy_from_slice(&value.to_le_bytes());
        }
        out[offset::RESERVED] = self.reserved;
        out[offset::BUTTONS] = self.button_byte;
        out
    }

    /// Whether the button byte carries the signature
    pub fn has_valid_signature(&self) -> bool {
        has_valid_signature(self.button_byte)
    }

    /// Scale to a `Sample` using the configured gyro range
    pub fn to_sample(&self, range_dps: f32) -> Sample {
        Sample {
            gyro: GyroRate {
                x: scale_gyro(self.gyro[0], range_dps),
                y: scale_gyro(self.gyro[1], range_dps),
                z: scale_gyro(self.gyro[2], range_dps),
            },
            buttons: Buttons::from_byte(self.button_byte),
        }
    }
}

/// Encode a well-formed packet
pub fn encode_packet(gyro: [i16; 3], buttons: Buttons) -> [u8; PACKET_SIZE] {
    RawPacket::new(gyro, buttons).to_bytes()
}
