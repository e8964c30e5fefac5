//! # Arena Gateway - Main Entry Point
//!
//! Bot-facing gateway of the Arena game platform. This entry point handles CLI
//! parsing, configuration loading, logging and application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! arena
//!
//! # Specify custom configuration
//! arena --config production.toml
//!
//! # Override specific settings
//! arena --socket-bind 0.0.0.0:2000 --websocket-bind "" --log-level debug
//!
//! # Point at another NATS server, or run without one
//! arena --bus-url nats://backend:4222
//! arena --local-bus
//!
//! # JSON logging for production
//! arena --json-logs
//! ```
//!
//! ## Configuration
//!
//! The gateway loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The gateway shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM; a second
//! signal exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod heartbeat;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the Arena gateway.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging needs the configured level before anything else runs.
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    app::apply_overrides(&mut config, &args);

    let log_records = match logging::setup_logging(&config.logging, args.json_logs) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("❌ Failed to setup logging: {e}");
            std::process::exit(1);
        }
    };

    match Application::new(args).await {
        Ok(app) => {
            let app = app.forward_logs(log_records);
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{BusSettings, HeartbeatSettings, LoggingSettings, ServerSettings};
pub use heartbeat::{Heartbeat, Ping};
pub use logging::{BusLogLayer, LogRecord};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cli_overrides_config() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config_path: PathBuf::from("test.toml"),
            socket_bind: Some("127.0.0.1:9000".to_string()),
            websocket_bind: Some(String::new()),
            bus_url: Some("nats://backend:4222".to_string()),
            local_bus: false,
            log_level: Some("debug".to_string()),
            json_logs: true,
        };

        app::apply_overrides(&mut config, &args);

        assert_eq!(config.server.socket_address, "127.0.0.1:9000");
        assert_eq!(config.server.websocket_address, "");
        assert_eq!(config.bus.url, "nats://backend:4222");
        assert!(!config.bus.embedded);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert!(config.validate().is_ok());

        let gateway = config.to_gateway_config().unwrap();
        assert_eq!(gateway.socket_address.map(|a| a.port()), Some(9000));
        assert!(gateway.websocket_address.is_none());
    }

    #[tokio::test]
    async fn test_application_creation() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("arena.toml"),
            socket_bind: Some("127.0.0.1:0".to_string()),
            websocket_bind: None,
            bus_url: None,
            local_bus: true,
            log_level: None,
            json_logs: false,
        };

        assert!(Application::new(args.clone()).await.is_ok());
        // The default file was written.
        assert!(args.config_path.exists());
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("arena.toml"),
            socket_bind: Some(String::new()),
            websocket_bind: Some(String::new()),
            bus_url: None,
            local_bus: true,
            log_level: None,
            json_logs: false,
        };

        let err = Application::new(args).await.err().expect("no listener enabled");
        assert!(err.to_string().contains("validation failed"));
    }

    #[tokio::test]
    async fn test_application_fails_without_reachable_bus() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("arena.toml"),
            socket_bind: Some("127.0.0.1:0".to_string()),
            websocket_bind: Some(String::new()),
            bus_url: Some("nats://127.0.0.1:1".to_string()),
            local_bus: false,
            log_level: None,
            json_logs: false,
        };

        let err = Application::new(args).await.err().expect("bus is unreachable");
        assert!(err.to_string().contains("bus connection error"));
    }
}
