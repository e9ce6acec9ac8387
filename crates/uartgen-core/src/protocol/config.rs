//! Protocol configuration
//!
//! Device limits and timing constants are plain values handed to the codec,
//! parser, prober and session. Nothing here is process-global.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEVICE_SIGNATURE};

/// Parameter ranges and identity of the generator firmware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Lowest accepted frequency in Hz
    pub frequency_min: u32,
    /// Highest accepted frequency in Hz
    pub frequency_max: u32,
    /// Lowest accepted duty cycle in percent
    pub duty_min: u32,
    /// Highest accepted duty cycle in percent
    pub duty_max: u32,
    /// Substring that identifies a compliant identity reply
    pub signature: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            frequency_min: 1,
            frequency_max: 40_000_000,
            duty_min: 0,
            duty_max: 100,
            signature: DEVICE_SIGNATURE.to_string(),
        }
    }
}

/// Timing and buffering used while probing a candidate port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
    /// Time allowed for the firmware to boot after open
    pub boot_delay_ms: u64,
    /// Overall budget measured from port open, boot delay included
    pub total_timeout_ms: u64,
    /// Gap between the two identity queries
    pub retry_gap_ms: u64,
    /// Pause after a read that returned nothing
    pub idle_poll_ms: u64,
    /// Accumulation buffer size that triggers a trim
    pub buffer_cap: usize,
    /// Bytes retained after a trim
    pub buffer_keep: usize,
    /// Listen window of the diagnostic probe
    pub diagnostic_window_ms: u64,
    /// Characters of captured text kept in a diagnostic preview
    pub preview_chars: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 150,
            write_timeout_ms: 2000,
            boot_delay_ms: 2500,
            total_timeout_ms: 5000,
            retry_gap_ms: 150,
            idle_poll_ms: 30,
            buffer_cap: 2048,
            buffer_keep: 1024,
            diagnostic_window_ms: 1500,
            preview_chars: 500,
        }
    }
}

impl ProbeConfig {
    /// Same defaults with a different overall budget
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn boot_delay(&self) -> Duration {
        Duration::from_millis(self.boot_delay_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    pub fn retry_gap(&self) -> Duration {
        Duration::from_millis(self.retry_gap_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn diagnostic_window(&self) -> Duration {
        Duration::from_millis(self.diagnostic_window_ms)
    }
}

/// Settings for an open control session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds; bounds how fast the reader notices a close
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
    /// How long a one-shot client waits for replies after sending
    pub reply_window_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            write_timeout_ms: 1000,
            reply_window_ms: 500,
        }
    }
}

impl SessionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn reply_window(&self) -> Duration {
        Duration::from_millis(self.reply_window_ms)
    }
}

/// Complete client settings, as read from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceProfile,
    pub probe: ProbeConfig,
    pub session: SessionConfig,
}

impl Settings {
    /// Parse settings from JSON text; absent fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Config(e.to_string()))
    }

    /// Load settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Override the baud rate used for both probing and sessions
    pub fn set_baud_rate(&mut self, baud_rate: u32) {
        self.probe.baud_rate = baud_rate;
        self.session.baud_rate = baud_rate;
    }
}
