//! Server configuration
//!
//! Read once at startup and immutable thereafter. Defaults mirror the
//! profile of the field deployment this engine was written for:
//! /dev/ttyS0 at 19200 baud, 8N1, slave ID 1, 100 entries per table.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TABLE_SIZE, MAX_SLAVE_ADDRESS};
use crate::error::{Result, RtuError};
use crate::frame::inter_frame_gap;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Modbus RTU slave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Serial device path
    #[serde(default = "default_device")]
    pub device: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Parity
    #[serde(default = "default_parity")]
    pub parity: Parity,
    /// Data bits per character (5-8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Station address this slave answers to (1-247)
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Entries in each of the four data-store tables
    #[serde(default = "default_table_size")]
    pub table_size: u16,
    /// Idle read timeout (milliseconds)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Fixed delay between reconnection attempts (milliseconds)
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Override of the computed 3.5-character inter-frame gap (microseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_gap_us: Option<u64>,
    /// Seed demo values into the store at startup (holding register 0 set
    /// to 1234, coil 0 off)
    #[serde(default)]
    pub seed_demo_values: bool,
}

// Default value functions for serde
fn default_device() -> String {
    "/dev/ttyS0".to_string()
}
fn default_baud_rate() -> u32 {
    19_200
}
fn default_parity() -> Parity {
    Parity::None
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_slave_id() -> u8 {
    1
}
fn default_table_size() -> u16 {
    DEFAULT_TABLE_SIZE
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_reconnect_interval_ms() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            parity: default_parity(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            slave_id: default_slave_id(),
            table_size: default_table_size(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            frame_gap_us: None,
            seed_demo_values: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RtuError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: ServerConfig = serde_yaml::from_str(&raw)
            .map_err(|e| RtuError::config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no serial line or Modbus station can have
    pub fn validate(&self) -> Result<()> {
        if self.slave_id == 0 || self.slave_id > MAX_SLAVE_ADDRESS {
            return Err(RtuError::config(format!(
                "slave_id {} outside 1-{} (0 is the broadcast address)",
                self.slave_id, MAX_SLAVE_ADDRESS
            )));
        }
        if self.baud_rate == 0 {
            return Err(RtuError::config("baud_rate must be non-zero"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(RtuError::config(format!(
                "data_bits {} outside 5-8",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(RtuError::config(format!(
                "stop_bits {} outside 1-2",
                self.stop_bits
            )));
        }
        if self.table_size == 0 {
            return Err(RtuError::config("table_size must be non-zero"));
        }
        if self.read_timeout_ms == 0 {
            return Err(RtuError::config("read_timeout_ms must be non-zero"));
        }
        Ok(())
    }

    /// Idle read timeout as a Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reconnect backoff as a Duration
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Inter-frame silence gap: the configured override, or 3.5 character
    /// times derived from the serial parameters
    pub fn frame_gap(&self) -> Duration {
        match self.frame_gap_us {
            Some(us) => Duration::from_micros(us),
            None => inter_frame_gap(
                self.baud_rate,
                self.data_bits,
                self.parity != Parity::None,
                self.stop_bits,
            ),
        }
    }
}
