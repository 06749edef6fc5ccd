//! Common types for transport layer

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Bluetooth serial port bound to a tty (`/dev/rfcommN`)
    Rfcomm,
    /// Any other character device or FIFO carrying the raw stream
    Serial,
    /// In-process byte feed (replay, tests)
    Memory,
}

impl TransportType {
    /// Guess the transport type from a device path
    pub fn from_path(path: &str) -> Self {
        if path.contains("rfcomm") {
            Self::Rfcomm
        } else {
            Self::Serial
        }
    }
}

/// Device identification information
#[derive(Debug, Clone)]
pub struct TransportDeviceInfo {
    /// Transport type
    pub transport_type: TransportType,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Human-readable name if known
    pub name: Option<String>,
}

impl TransportDeviceInfo {
    /// Name for log lines: the device name if known, else its path
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.device_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_type_from_path() {
        assert_eq!(TransportType::from_path("/dev/rfcomm0"), TransportType::Rfcomm);
        assert_eq!(TransportType::from_path("/dev/ttyUSB0"), TransportType::Serial);
    }
}
