//! Configuration for the gyromouse pipeline
//!
//! Read from TOML; every field has a default so a missing file or a partial
//! file both work. The file is never written back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gyromouse_pointer::ScreenBounds;
use gyromouse_transport::{TtyConfig, DEFAULT_BUFFER_CAPACITY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Link to the remote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// RFCOMM or serial device node
    #[serde(default = "default_device_path")]
    pub path: PathBuf,
    /// Open attempts per connection episode
    #[serde(default = "default_connection_retries")]
    pub max_connection_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_device_path() -> PathBuf {
    PathBuf::from("/dev/rfcomm0")
}
fn default_connection_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_read_timeout_ms() -> u64 {
    100
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: default_device_path(),
            max_connection_retries: default_connection_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// Framing and decoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Consecutive valid packets at one offset before alignment is accepted
    #[serde(default = "default_alignment_threshold")]
    pub alignment_threshold: u32,
    /// Failed packet windows before alignment is abandoned
    #[serde(default = "default_alignment_attempts")]
    pub max_alignment_attempts: u32,
    /// Full-scale gyro range in degrees per second
    #[serde(default = "default_gyro_range")]
    pub gyro_range_dps: f32,
    /// Whole packets allowed to queue up before the oldest are dropped
    #[serde(default = "default_packet_backlog")]
    pub max_packet_backlog: usize,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_alignment_threshold() -> u32 {
    15
}
fn default_alignment_attempts() -> u32 {
    300
}
fn default_gyro_range() -> f32 {
    500.0
}
fn default_packet_backlog() -> usize {
    3
}
fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            alignment_threshold: default_alignment_threshold(),
            max_alignment_attempts: default_alignment_attempts(),
            gyro_range_dps: default_gyro_range(),
            max_packet_backlog: default_packet_backlog(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

/// Dead-zones and response curves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapingConfig {
    #[serde(default = "default_pointer_dead_zone")]
    pub pointer_dead_zone: f32,
    #[serde(default = "default_scroll_dead_zone")]
    pub scroll_dead_zone: f32,
    /// Response curve exponent (1.0 = linear)
    #[serde(default = "default_pointer_exponent")]
    pub pointer_exponent: f32,
    #[serde(default = "default_pointer_divisor")]
    pub pointer_divisor: f32,
    #[serde(default = "default_scroll_exponent")]
    pub scroll_exponent: f32,
    #[serde(default = "default_scroll_divisor")]
    pub scroll_divisor: f32,
}

fn default_pointer_dead_zone() -> f32 {
    0.3
}
fn default_scroll_dead_zone() -> f32 {
    3.0
}
fn default_pointer_exponent() -> f32 {
    1.4
}
fn default_pointer_divisor() -> f32 {
    10.0
}
fn default_scroll_exponent() -> f32 {
    1.5
}
fn default_scroll_divisor() -> f32 {
    15.0
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            pointer_dead_zone: default_pointer_dead_zone(),
            scroll_dead_zone: default_scroll_dead_zone(),
            pointer_exponent: default_pointer_exponent(),
            pointer_divisor: default_pointer_divisor(),
            scroll_exponent: default_scroll_exponent(),
            scroll_divisor: default_scroll_divisor(),
        }
    }
}

/// Middle-button scroll/drag disambiguation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureConfig {
    /// Scroll-axis rate (dps) that commits to scrolling
    #[serde(default = "default_scroll_tolerance")]
    pub scroll_tolerance: f32,
    /// Pointer-axis rate (dps) that commits to dragging
    #[serde(default = "default_drag_tolerance")]
    pub drag_tolerance: f32,
}

fn default_scroll_tolerance() -> f32 {
    25.0
}
fn default_drag_tolerance() -> f32 {
    20.0
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            scroll_tolerance: default_scroll_tolerance(),
            drag_tolerance: default_drag_tolerance(),
        }
    }
}

/// Tick, sample and watchdog timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Extrapolation tick period
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    /// Nominal interval between packets from the remote
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_watchdog_poll_ms")]
    pub watchdog_poll_ms: u64,
    /// Silence before a warning is logged
    #[serde(default = "default_watchdog_warn_ms")]
    pub watchdog_warn_ms: u64,
    /// Silence before the link is declared stale
    #[serde(default = "default_watchdog_stale_ms")]
    pub watchdog_stale_ms: u64,
    /// Longest gap a single extrapolation tick may cover
    #[serde(default = "default_max_hold_ms")]
    pub max_hold_ms: u64,
}

fn default_tick_period_ms() -> u64 {
    1
}
fn default_sample_interval_ms() -> u64 {
    10
}
fn default_watchdog_poll_ms() -> u64 {
    100
}
fn default_watchdog_warn_ms() -> u64 {
    200
}
fn default_watchdog_stale_ms() -> u64 {
    400
}
fn default_max_hold_ms() -> u64 {
    50
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            sample_interval_ms: default_sample_interval_ms(),
            watchdog_poll_ms: default_watchdog_poll_ms(),
            watchdog_warn_ms: default_watchdog_warn_ms(),
            watchdog_stale_ms: default_watchdog_stale_ms(),
            max_hold_ms: default_max_hold_ms(),
        }
    }
}

impl TimingConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_millis(self.watchdog_poll_ms)
    }

    pub fn watchdog_warn(&self) -> Duration {
        Duration::from_millis(self.watchdog_warn_ms)
    }

    pub fn watchdog_stale(&self) -> Duration {
        Duration::from_millis(self.watchdog_stale_ms)
    }

    pub fn max_hold(&self) -> Duration {
        Duration::from_millis(self.max_hold_ms)
    }
}

/// Virtual pointer device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerConfig {
    /// Name for the virtual pointer device
    #[serde(default = "default_pointer_name")]
    pub device_name: String,
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Send the left button as a touch contact instead of BTN_LEFT
    #[serde(default)]
    pub left_as_touch: bool,
}

fn default_pointer_name() -> String {
    "Gyromouse Virtual Pointer".to_string()
}
fn default_screen_width() -> u32 {
    1920
}
fn default_screen_height() -> u32 {
    1080
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            device_name: default_pointer_name(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            left_as_touch: false,
        }
    }
}

impl PointerConfig {
    pub fn screen_bounds(&self) -> ScreenBounds {
        ScreenBounds {
            width: self.screen_width,
            height: self.screen_height,
        }
    }
}

/// Complete gyromouse configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GyromouseConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub shaping: ShapingConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub pointer: PointerConfig,
}

impl GyromouseConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gyromouse")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, msg: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(msg.to_string()))
            }
        }

        let p = &self.protocol;
        check(p.alignment_threshold > 0, "protocol.alignment_threshold must be > 0")?;
        check(p.max_alignment_attempts > 0, "protocol.max_alignment_attempts must be > 0")?;
        check(p.gyro_range_dps > 0.0, "protocol.gyro_range_dps must be > 0")?;
        check(p.max_packet_backlog > 0, "protocol.max_packet_backlog must be > 0")?;
        check(
            p.buffer_capacity >= gyromouse_transport::PACKET_SIZE * (p.max_packet_backlog + 1),
            "protocol.buffer_capacity must hold the packet backlog plus one packet",
        )?;

        let s = &self.shaping;
        check(
            s.pointer_dead_zone >= 0.0 && s.scroll_dead_zone >= 0.0,
            "shaping dead-zones must not be negative",
        )?;
        check(
            s.pointer_exponent > 0.0 && s.scroll_exponent > 0.0,
            "shaping exponents must be > 0",
        )?;
        check(
            s.pointer_divisor != 0.0 && s.scroll_divisor != 0.0,
            "shaping divisors must not be zero",
        )?;

        let g = &self.gesture;
        check(
            g.scroll_tolerance >= 0.0 && g.drag_tolerance >= 0.0,
            "gesture tolerances must not be negative",
        )?;

        let t = &self.timing;
        check(t.tick_period_ms > 0, "timing.tick_period_ms must be > 0")?;
        check(t.sample_interval_ms > 0, "timing.sample_interval_ms must be > 0")?;
        check(t.watchdog_poll_ms > 0, "timing.watchdog_poll_ms must be > 0")?;
        check(
            t.watchdog_stale_ms > t.watchdog_warn_ms,
            "timing.watchdog_stale_ms must be greater than timing.watchdog_warn_ms",
        )?;

        check(
            self.pointer.screen_width > 0 && self.pointer.screen_height > 0,
            "pointer screen size must be non-zero",
        )?;
        Ok(())
    }

    /// Transport settings for the tty link
    pub fn tty_config(&self) -> TtyConfig {
        TtyConfig {
            path: self.device.path.clone(),
            max_connection_retries: self.device.max_connection_retries,
            retry_delay: Duration::from_millis(self.device.retry_delay_ms),
            read_timeout: Duration::from_millis(self.device.read_timeout_ms),
            buffer_capacity: self.protocol.buffer_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GyromouseConfig::default();
        config.validate().unwrap();
        assert_eq!(config.protocol.alignment_threshold, 15);
        assert_eq!(config.protocol.max_alignment_attempts, 300);
        assert_eq!(config.timing.watchdog_stale(), Duration::from_millis(400));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = GyromouseConfig::parse(
            r#"
[shaping]
pointer_exponent = 1.2

[pointer]
left_as_touch = true
"#,
        )
        .unwrap();
        assert_eq!(config.shaping.pointer_exponent, 1.2);
        assert_eq!(config.shaping.pointer_divisor, 10.0);
        assert!(config.pointer.left_as_touch);
        assert_eq!(config.device.path, PathBuf::from("/dev/rfcomm0"));
    }

    #[test]
    fn test_roundtrip() {
        let config = GyromouseConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[timing]"));
        let parsed = GyromouseConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.pointer.device_name, config.pointer.device_name);
        assert_eq!(parsed.gesture.drag_tolerance, 20.0);
    }

    #[test]
    fn test_validate_rejects_bad_watchdog() {
        let mut config = GyromouseConfig::default();
        config.timing.watchdog_stale_ms = config.timing.watchdog_warn_ms;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_backlog() {
        let mut config = GyromouseConfig::default();
        config.protocol.max_packet_backlog = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_divisor() {
        let mut config = GyromouseConfig::default();
        config.shaping.scroll_divisor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config =
            GyromouseConfig::load(Path::new("/nonexistent/gyromouse/config.toml")).unwrap();
        assert_eq!(config.timing.tick_period_ms, 1);
    }

    #[test]
    fn test_tty_config_mapping() {
        let mut config = GyromouseConfig::default();
        config.device.retry_delay_ms = 250;
        let tty = config.tty_config();
        assert_eq!(tty.retry_delay, Duration::from_millis(250));
        assert_eq!(tty.max_connection_retries, 3);
        assert_eq!(tty.buffer_capacity, 256);
    }
}
