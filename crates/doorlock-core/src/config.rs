//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration for a board on `/dev/ttyUSB1` and a reader on
//! `/dev/ttyUSB0`.
//!
//! ```
//! use doorlock_core::Config;
//!
//! let config = Config::from_toml_str(
//!     r#"
//!     [relay]
//!     port = "/dev/ttyS1"
//!
//!     [relay.ports]
//!     door = 8
//!
//!     [access]
//!     door_open_ms = 5000
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.relay.port, "/dev/ttyS1");
//! assert_eq!(config.relay.ports.door.as_u8(), 8);
//! assert_eq!(config.access.door_open().as_millis(), 5000);
//! ```

use crate::constants::{
    DEFAULT_CLOSE_ATTEMPTS, DEFAULT_DENY_DWELL_MS, DEFAULT_DOOR_OPEN_MS, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_RFID_BAUD_RATE, DEFAULT_STAGGER_DELAY_MS,
};
use crate::{Error, RelayNumber, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rfid: RfidConfig,
    pub relay: RelayConfig,
    pub access: AccessConfig,
    pub registry: RegistryConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails [`Config::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.rfid.port.trim().is_empty() {
            return Err(Error::Config("rfid.port must not be empty".to_string()));
        }
        if self.relay.port.trim().is_empty() {
            return Err(Error::Config("relay.port must not be empty".to_string()));
        }
        if self.relay.response_timeout_ms == 0 {
            return Err(Error::Config(
                "relay.response_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.access.door_open_ms == 0 {
            return Err(Error::Config(
                "access.door_open_ms must be greater than 0".to_string(),
            ));
        }
        if self.access.close_attempts == 0 {
            return Err(Error::Config(
                "access.close_attempts must be at least 1".to_string(),
            ));
        }

        let ports = self.relay.ports;
        let assigned = [ports.door, ports.red, ports.yellow, ports.green];
        let unique: HashSet<_> = assigned.iter().collect();
        if unique.len() != assigned.len() {
            return Err(Error::Config(format!(
                "relay.ports must assign distinct relays, got door={} red={} yellow={} green={}",
                ports.door.as_u8(),
                ports.red.as_u8(),
                ports.yellow.as_u8(),
                ports.green.as_u8()
            )));
        }

        Ok(())
    }
}

/// RFID reader serial line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfidConfig {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for RfidConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_RFID_BAUD_RATE,
        }
    }
}

/// Relay board serial line and timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub port: String,
    pub response_timeout_ms: u64,
    pub stagger_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub ports: RelayPorts,
}

impl RelayConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn stagger_delay(&self) -> Duration {
        Duration::from_millis(self.stagger_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB1".to_string(),
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            stagger_delay_ms: DEFAULT_STAGGER_DELAY_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            ports: RelayPorts::default(),
        }
    }
}

/// Which relay drives which device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayPorts {
    /// Door strike.
    pub door: RelayNumber,
    /// Red lamp, lit on denied access.
    pub red: RelayNumber,
    /// Yellow lamp, lit while idle and on denied access.
    pub yellow: RelayNumber,
    /// Green lamp, lit while the door is open.
    pub green: RelayNumber,
}

impl Default for RelayPorts {
    fn default() -> Self {
        Self {
            door: RelayNumber::new_unchecked(1),
            red: RelayNumber::new_unchecked(2),
            yellow: RelayNumber::new_unchecked(3),
            green: RelayNumber::new_unchecked(4),
        }
    }
}

/// Timing of the access sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub door_open_ms: u64,
    pub deny_dwell_ms: u64,
    pub close_attempts: u32,
}

impl AccessConfig {
    pub fn door_open(&self) -> Duration {
        Duration::from_millis(self.door_open_ms)
    }

    pub fn deny_dwell(&self) -> Duration {
        Duration::from_millis(self.deny_dwell_ms)
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            door_open_ms: DEFAULT_DOOR_OPEN_MS,
            deny_dwell_ms: DEFAULT_DENY_DWELL_MS,
            close_attempts: DEFAULT_CLOSE_ATTEMPTS,
        }
    }
}

/// Card/user registry location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path of the SQLite database file.
    pub database: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database: "doorlock.db".to_string(),
        }
    }
}

/// Diagnostic log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
