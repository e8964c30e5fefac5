//! Periodic liveness announcements on the bus.
//!
//! Backend services watch the `ping` subject to learn which gateways are up
//! and how many bots each one carries.

use arena_bus::{BusError, MessageBus};
use arena_gateway::ConnectionRegistry;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

pub const PING_SUBJECT: &str = "ping";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub ping: String,
    pub service_id: String,
    /// RFC 3339 timestamp
    pub time: String,
    pub connections: usize,
}

pub struct Heartbeat {
    bus: Arc<dyn MessageBus>,
    registry: Arc<ConnectionRegistry>,
    service_name: String,
    service_id: Uuid,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<ConnectionRegistry>,
        service_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            bus,
            registry,
            service_name: service_name.into(),
            service_id: Uuid::new_v4(),
            interval,
        }
    }

    /// Identifier of this gateway instance, stable for the process lifetime.
    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    /// Publishes a single ping.
    pub async fn beat(&self) -> Result<(), BusError> {
        let ping = Ping {
            ping: self.service_name.clone(),
            service_id: self.service_id.to_string(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            connections: self.registry.count().await,
        };
        let payload = serde_json::to_vec(&ping).unwrap_or_default();
        self.bus.publish(PING_SUBJECT, payload).await
    }

    /// Publishes a ping every interval until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("💓 Heartbeat {} every {:?}", self.service_id, self.interval);

            loop {
                ticker.tick().await;
                if let Err(e) = self.beat().await {
                    warn!("💓 Heartbeat failed: {}", e);
                }
            }
        })
    }
}
