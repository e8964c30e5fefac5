//! Configuration management for the Arena gateway.
//!
//! This module handles loading, validation, and conversion of the gateway
//! configuration from TOML files and command-line arguments.

use arena_gateway::{GatewayConfig, SessionSettings, TransportSettings};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Bounds for bus request timeouts, in milliseconds.
const MIN_REQUEST_TIMEOUT_MS: u64 = 1_000;
const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener addresses
    pub server: ServerSettings,
    /// Backend bus settings
    #[serde(default)]
    pub bus: BusSettings,
    /// Transport timing and buffering
    #[serde(default)]
    pub transport: TransportSection,
    /// Liveness announcements on the bus
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Listener configuration. An empty address disables that listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Line-delimited TCP listener (e.g., "0.0.0.0:2000")
    #[serde(default)]
    pub socket_address: String,
    /// WebSocket listener (e.g., "0.0.0.0:2001")
    #[serde(default)]
    pub websocket_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSettings {
    /// NATS server the backend listens on
    #[serde(default = "default_bus_url")]
    pub url: String,
    /// Run against an in-process bus instead of connecting to `url`
    #[serde(default)]
    pub embedded: bool,
    /// Timeout of registration, join and action requests
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_wait_ms")]
    pub read_wait_ms: u64,
    #[serde(default = "default_wait_ms")]
    pub write_wait_ms: u64,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    /// Name announced in every ping
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
    /// Mirror log events onto the bus under `log.<level>`
    #[serde(default)]
    pub forward_to_bus: bool,
}

fn default_bus_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_request_timeout_ms() -> u64 {
    SessionSettings::default().request_timeout_ms
}

fn default_wait_ms() -> u64 {
    10_000
}

fn default_outbound_buffer() -> usize {
    TransportSettings::default().outbound_buffer
}

fn default_max_line_bytes() -> usize {
    TransportSettings::default().max_line_bytes
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval_ms() -> u64 {
    1_000
}

fn default_service_name() -> String {
    "aiServer".to_string()
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            embedded: false,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            read_wait_ms: default_wait_ms(),
            write_wait_ms: default_wait_ms(),
            outbound_buffer: default_outbound_buffer(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_heartbeat_interval_ms(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                socket_address: "0.0.0.0:2000".to_string(),
                websocket_address: "0.0.0.0:2001".to_string(),
            },
            bus: BusSettings::default(),
            transport: TransportSection::default(),
            heartbeat: HeartbeatSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                forward_to_bus: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        let socket = parse_listener("socket_address", &self.server.socket_address)?;
        let websocket = parse_listener("websocket_address", &self.server.websocket_address)?;
        if socket.is_none() && websocket.is_none() {
            return Err("At least one of socket_address and websocket_address must be set".to_string());
        }

        if !self.bus.embedded && self.bus.url.trim().is_empty() {
            return Err("bus.url cannot be empty unless bus.embedded is set".to_string());
        }

        let timeout = self.bus.request_timeout_ms;
        if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&timeout) {
            return Err(format!(
                "bus.request_timeout_ms must be between {MIN_REQUEST_TIMEOUT_MS} and {MAX_REQUEST_TIMEOUT_MS}, got {timeout}"
            ));
        }

        if self.transport.read_wait_ms == 0 || self.transport.write_wait_ms == 0 {
            return Err("transport wait times must be greater than 0".to_string());
        }
        if self.transport.outbound_buffer == 0 {
            return Err("transport.outbound_buffer must be greater than 0".to_string());
        }
        if self.transport.max_line_bytes == 0 {
            return Err("transport.max_line_bytes must be greater than 0".to_string());
        }

        if self.heartbeat.enabled {
            if self.heartbeat.interval_ms == 0 {
                return Err("heartbeat.interval_ms must be greater than 0".to_string());
            }
            if self.heartbeat.service_name.is_empty() {
                return Err("heartbeat.service_name cannot be empty".to_string());
            }
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    /// Converts the application configuration into the gateway's own
    /// configuration.
    pub fn to_gateway_config(&self) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
        Ok(GatewayConfig {
            socket_address: parse_listener("socket_address", &self.server.socket_address)?,
            websocket_address: parse_listener("websocket_address", &self.server.websocket_address)?,
            session: SessionSettings {
                request_timeout_ms: self.bus.request_timeout_ms,
            },
            transport: TransportSettings {
                read_wait_ms: self.transport.read_wait_ms,
                write_wait_ms: self.transport.write_wait_ms,
                outbound_buffer: self.transport.outbound_buffer,
                max_line_bytes: self.transport.max_line_bytes,
            },
        })
    }
}

fn parse_listener(name: &str, address: &str) -> Result<Option<SocketAddr>, String> {
    let address = address.trim();
    if address.is_empty() {
        return Ok(None);
    }
    address
        .parse()
        .map(Some)
        .map_err(|_| format!("Invalid {name}: {address}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.socket_address, "0.0.0.0:2000");
        assert_eq!(config.server.websocket_address, "0.0.0.0:2001");
        assert_eq!(config.bus.url, "nats://127.0.0.1:4222");
        assert!(!config.bus.embedded);
        assert_eq!(config.bus.request_timeout_ms, 10_000);
        assert_eq!(config.transport.read_wait_ms, 10_000);
        assert_eq!(config.transport.outbound_buffer, 64);
        assert!(config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval_ms, 1_000);
        assert_eq!(config.heartbeat.service_name, "aiServer");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(!config.logging.forward_to_bus);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arena.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());

        // The default file is written and reads back identically.
        assert!(path.exists());
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
socket_address = "127.0.0.1:4000"
websocket_address = ""

[bus]
url = "nats://backend.internal:4222"
request_timeout_ms = 3000

[transport]
read_wait_ms = 5000

[logging]
level = "debug"
json_format = true
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(config.server.socket_address, "127.0.0.1:4000");
        assert_eq!(config.bus.url, "nats://backend.internal:4222");
        assert!(!config.bus.embedded);
        assert_eq!(config.bus.request_timeout_ms, 3000);
        assert_eq!(config.transport.read_wait_ms, 5000);
        // Unspecified values fall back to defaults.
        assert_eq!(config.transport.write_wait_ms, 10_000);
        assert_eq!(config.heartbeat, HeartbeatSettings::default());
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);

        let gateway = config.to_gateway_config().unwrap();
        assert_eq!(gateway.socket_address, Some("127.0.0.1:4000".parse().unwrap()));
        assert_eq!(gateway.websocket_address, None);
        assert_eq!(gateway.session.request_timeout_ms, 3000);
        assert_eq!(gateway.transport.read_wait_ms, 5000);
    }

    #[tokio::test]
    async fn test_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[server\nsocket_address = ")
            .await
            .unwrap();

        assert!(AppConfig::load_from_file(&temp_file.path().to_path_buf())
            .await
            .is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.server.socket_address = "not an address".to_string();
        assert!(config.validate().is_err());

        config.server.socket_address = String::new();
        assert!(config.validate().is_ok());
        config.server.websocket_address = String::new();
        assert!(config.validate().unwrap_err().contains("At least one"));

        config = AppConfig::default();
        config.bus.request_timeout_ms = 500;
        assert!(config.validate().is_err());
        config.bus.request_timeout_ms = 61_000;
        assert!(config.validate().is_err());
        config.bus.request_timeout_ms = 3_000;
        assert!(config.validate().is_ok());

        config.bus.url = String::new();
        assert!(config.validate().unwrap_err().contains("bus.url"));
        config.bus.embedded = true;
        assert!(config.validate().is_ok());

        config.transport.outbound_buffer = 0;
        assert!(config.validate().is_err());
        config.transport.outbound_buffer = 16;

        config.heartbeat.interval_ms = 0;
        assert!(config.validate().is_err());
        config.heartbeat.enabled = false;
        assert!(config.validate().is_ok());

        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
