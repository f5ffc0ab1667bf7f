//! Configuration for the relay.

use axum::http::HeaderValue;
use coilcast_common::{DEFAULT_MODBUS_PORT, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::poller::ClientSettings;
use crate::transport::TcpConnector;

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

/// Complete relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// HTTP and WebSocket endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Upstream Modbus server and polling settings.
    #[serde(default)]
    pub modbus: ModbusClientConfig,

    /// Session log settings.
    #[serde(default)]
    pub session_log: SessionLogConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "127.0.0.1:8000").
    #[serde(default = "default_http_listen")]
    pub listen: String,

    /// Origins allowed by CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_http_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5006".to_string(),
        "http://127.0.0.1:5006".to_string(),
    ]
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl HttpConfig {
    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Validation(format!("Invalid listen address: {}", self.listen)))
    }
}

/// Upstream Modbus server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusClientConfig {
    /// Server host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 5020).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit identifier.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Backoff after a failed cycle.
    #[serde(default = "default_timeout_ms")]
    pub retry_delay_ms: u64,

    /// Spacing of successful cycles in standalone mode.
    #[serde(default = "default_timeout_ms")]
    pub poll_interval_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MODBUS_PORT
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for ModbusClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unit_id: default_unit_id(),
            connect_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
            retry_delay_ms: default_timeout_ms(),
            poll_interval_ms: default_timeout_ms(),
        }
    }
}

impl ModbusClientConfig {
    /// Client timing parameters.
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Connector for the configured server.
    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(self.host.clone(), self.port, self.unit_id)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Session log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogConfig {
    /// Directory receiving session log files (default: current directory).
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SessionLogConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.listen_addr()?;

        for origin in &self.http.cors_origins {
            if origin == "*" || HeaderValue::from_str(origin).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid CORS origin: {}",
                    origin
                )));
            }
        }

        if self.modbus.host.is_empty() {
            return Err(ConfigError::Validation(
                "modbus host must not be empty".to_string(),
            ));
        }

        let durations = [
            ("connect_timeout_ms", self.modbus.connect_timeout_ms),
            ("read_timeout_ms", self.modbus.read_timeout_ms),
            ("poll_interval_ms", self.modbus.poll_interval_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{} must be > 0", name)));
            }
        }

        Ok(())
    }
}
