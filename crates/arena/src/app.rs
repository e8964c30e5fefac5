//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that wires the bus, the
//! gateway server and the heartbeat together and runs them until shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    heartbeat::Heartbeat,
    logging::{display_banner, spawn_log_forwarder, LogRecord},
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use arena_bus::{BusStats, LocalBus, MessageBus, NatsBus};
use arena_gateway::{ConnectionRegistry, GatewayServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Main application struct.
///
/// Owns the configuration, the bus every session talks through and the
/// gateway server.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Message bus shared by all connections
    bus: Arc<dyn MessageBus>,
    /// Gateway server instance
    server: Arc<GatewayServer>,
    /// Log events waiting to be mirrored onto the bus
    log_records: Option<mpsc::Receiver<LogRecord>>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Connect the bus (NATS unless embedded) and create the gateway server
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let gateway_config = config.to_gateway_config()?;
        let bus: Arc<dyn MessageBus> = if config.bus.embedded {
            info!("🧪 Using the in-process bus, no backend is reachable");
            Arc::new(LocalBus::new())
        } else {
            info!("🔌 Connecting to bus at {}", config.bus.url);
            Arc::new(NatsBus::connect(&config.bus.url, &config.heartbeat.service_name).await?)
        };
        let server = Arc::new(GatewayServer::new(gateway_config, bus.clone()));

        Ok(Self {
            config,
            bus,
            server,
            log_records: None,
        })
    }

    /// Mirrors the queued log events onto the bus once the gateway runs.
    pub fn forward_logs(mut self, records: Option<mpsc::Receiver<LogRecord>>) -> Self {
        self.log_records = records;
        self
    }

    /// Runs the gateway until a shutdown signal arrives.
    ///
    /// Binding failures are returned before anything is served. After the
    /// first signal the accept loops and the heartbeat stop, the bus closes
    /// and final statistics are logged; a second signal exits immediately.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Arena Gateway");
        self.log_configuration_summary();

        let log_forwarder = self
            .log_records
            .take()
            .map(|records| spawn_log_forwarder(records, self.bus.clone()));

        let listeners = self.server.bind().await?;

        let server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                match server.serve(listeners).await {
                    Ok(()) => info!("✅ Accept loops stopped"),
                    Err(e) => {
                        error!("❌ Server error: {}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        let heartbeat_handle = if self.config.heartbeat.enabled {
            let heartbeat = Heartbeat::new(
                self.bus.clone(),
                self.server.registry(),
                self.config.heartbeat.service_name.clone(),
                Duration::from_millis(self.config.heartbeat.interval_ms),
            );
            info!(
                "💓 Heartbeat as '{}' ({}) every {}ms",
                self.config.heartbeat.service_name,
                heartbeat.service_id(),
                self.config.heartbeat.interval_ms
            );
            Some(heartbeat.spawn())
        } else {
            info!("⏸️ Heartbeat disabled");
            None
        };

        info!("✅ Arena Gateway is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown_signal().await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again! Exiting now.");
            std::process::exit(1);
        });

        info!("🧹 Stopping accept loops...");
        self.server.shutdown();
        if tokio::time::timeout(Duration::from_secs(5), server_handle)
            .await
            .is_err()
        {
            warn!("⏰ Accept loops did not stop within timeout, proceeding with cleanup");
        }

        if let Some(handle) = heartbeat_handle {
            handle.abort();
        }

        log_final_statistics(&self.bus.stats(), &self.server.registry()).await;

        if let Some(handle) = log_forwarder {
            handle.abort();
        }
        self.bus.shutdown().await;
        info!("✅ Arena Gateway shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        let listener = |address: &str| {
            if address.trim().is_empty() {
                "disabled".to_string()
            } else {
                address.to_string()
            }
        };
        info!("📋 Configuration Summary:");
        info!("  🔌 Socket listener: {}", listener(&self.config.server.socket_address));
        info!("  🌐 WebSocket listener: {}", listener(&self.config.server.websocket_address));
        if self.config.bus.embedded {
            info!("  📮 Bus: in-process");
        } else {
            info!("  📮 Bus: {}", self.config.bus.url);
        }
        info!("  ⏱️ Bus request timeout: {}ms", self.config.bus.request_timeout_ms);
        info!(
            "  📶 Read/write wait: {}ms/{}ms",
            self.config.transport.read_wait_ms, self.config.transport.write_wait_ms
        );
    }
}

/// Applies command-line overrides on top of the file configuration.
pub(crate) fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(address) = &args.socket_bind {
        config.server.socket_address = address.clone();
    }
    if let Some(address) = &args.websocket_bind {
        config.server.websocket_address = address.clone();
    }
    if let Some(url) = &args.bus_url {
        config.bus.url = url.clone();
    }
    if args.local_bus {
        config.bus.embedded = true;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

/// Logs final statistics during shutdown.
async fn log_final_statistics(stats: &BusStats, registry: &ConnectionRegistry) {
    info!("📊 Final Statistics:");
    info!("  - Messages published: {}", stats.messages_published);
    info!("  - Messages delivered: {}", stats.messages_delivered);
    info!(
        "  - Requests sent: {} ({} timed out)",
        stats.requests_sent, stats.requests_timed_out
    );
    let (sockets, websockets) = registry.count_by_kind().await;
    info!(
        "  - Connections still open: {} socket, {} websocket",
        sockets, websockets
    );
}
