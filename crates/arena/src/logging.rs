//! Logging system setup and configuration.
//!
//! This module handles the initialization and configuration of the tracing-based
//! logging system with support for both human-readable and JSON output formats.
//! Events can additionally be mirrored onto the bus under `log.<level>` so
//! backend operators see gateway diagnostics next to their own.

use crate::config::LoggingSettings;
use arena_bus::MessageBus;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{info, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log events waiting for the bus; further events are dropped when full.
const FORWARD_QUEUE: usize = 1024;

/// Targets never mirrored onto the bus, since publishing emits events there.
const QUIET_TARGETS: [&str; 2] = ["arena_bus", "async_nats"];

/// Initializes the logging system with the specified configuration.
///
/// # Arguments
///
/// * `config` - Logging configuration from the config file
/// * `json_format` - Whether to force JSON output format (CLI override)
///
/// # Returns
///
/// When `forward_to_bus` is set, the receiving end of the queue that
/// [`spawn_log_forwarder`] drains once the bus is up.
///
/// # Features
///
/// * **Environment variable support** - Respects `RUST_LOG` if set
/// * **Flexible formatting** - Human-readable or JSON output
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<Option<mpsc::Receiver<LogRecord>>, Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (bus_layer, records) = if config.forward_to_bus {
        let (layer, records) = BusLogLayer::new(FORWARD_QUEUE);
        (Some(layer), Some(records))
    } else {
        (None, None)
    };

    let registry = tracing_subscriber::registry().with(filter).with(bus_layer);

    if json_format || config.json_format {
        registry
            .with(
                fmt_layer::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt_layer::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(false),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(records)
}

/// One log event captured for the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl LogRecord {
    /// Subject the record is published on, e.g. `log.warn`.
    pub fn subject(&self) -> String {
        format!("log.{}", self.level.as_str().to_ascii_lowercase())
    }

    /// Text payload in the `[LEVEL] target: message` form.
    pub fn to_line(&self) -> String {
        format!("[{}] {}: {}", self.level, self.target, self.message)
    }
}

/// A `tracing` layer queuing every event for publication on the bus.
pub struct BusLogLayer {
    sender: mpsc::Sender<LogRecord>,
}

impl BusLogLayer {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LogRecord>) {
        let (sender, records) = mpsc::channel(capacity.max(1));
        (Self { sender }, records)
    }
}

impl<S: Subscriber> Layer<S> for BusLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if QUIET_TARGETS.iter().any(|quiet| target.starts_with(quiet)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let _ = self.sender.try_send(LogRecord {
            level: *metadata.level(),
            target: target.to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Publishes queued log records until the queue closes.
pub fn spawn_log_forwarder(
    mut records: mpsc::Receiver<LogRecord>,
    bus: Arc<dyn MessageBus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = records.recv().await {
            // Failures stay silent: reporting them would queue another record.
            let _ = bus
                .publish(&record.subject(), record.to_line().into_bytes())
                .await;
        }
    })
}

/// Displays the startup banner.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║             🤖 ARENA GATEWAY 🤖          ║");
    info!("║                 v{:<10}              ║", version);
    info!("║                                          ║");
    info!("║  Bots in over TCP lines and WebSockets   ║");
    info!("║  Games out over the message bus          ║");
    info!("╚══════════════════════════════════════════╝");
}
