//! Configuration for the coil server.

use coilcast_common::{DEFAULT_MODBUS_PORT, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Modbus endpoint and publisher settings
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Modbus endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Address to listen on (default: "0.0.0.0:5020")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Publisher tick interval in milliseconds
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

fn default_listen() -> String {
    format!("0.0.0.0:{}", DEFAULT_MODBUS_PORT)
}

fn default_update_interval_ms() -> u64 {
    100
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

impl ModbusConfig {
    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Validation(format!("Invalid listen address: {}", self.listen)))
    }

    /// Publisher tick interval.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl ServerConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.modbus.listen_addr()?;

        if self.modbus.update_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "update_interval_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
