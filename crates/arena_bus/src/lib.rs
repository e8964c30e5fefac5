//! # Arena Bus
//!
//! The messaging backbone between the bot gateway and the game backend.
//!
//! The gateway never talks to game services directly. Everything goes through
//! a subject-addressed bus offering two interaction styles:
//!
//! - **Request/Reply**: send a payload to a subject and wait (bounded by a
//!   timeout) for exactly one answer.
//! - **Publish/Subscribe**: fire-and-forget publishing, and subscriptions that
//!   receive every message whose subject matches a pattern.
//!
//! ## Subjects
//!
//! Subjects are dot-separated tokens such as `registerAI`, `G1.join` or
//! `bot-42.gameState`. Subscription patterns may use `*` to match exactly one
//! token and a trailing `>` to match one or more remaining tokens
//! (`log.>` matches `log.info` and `log.conn.debug`).
//!
//! ## Components
//!
//! - [`MessageBus`] - the object-safe contract consumed by the gateway
//! - [`NatsBus`] - the production implementation over a NATS connection
//! - [`LocalBus`] - in-process implementation with ordered per-subscription
//!   dispatch, used for embedded runs and by tests as a fake backend
//! - [`BusStats`] - counters for monitoring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arena_bus::{handler_fn, BusMessage, LocalBus, MessageBus};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), arena_bus::BusError> {
//! let bus = Arc::new(LocalBus::new());
//! let responder = bus.clone();
//!
//! bus.subscribe("registerAI", handler_fn(move |msg: BusMessage| {
//!     let responder = responder.clone();
//!     async move {
//!         if let Some(reply_to) = msg.reply_to {
//!             let _ = responder.publish(&reply_to, br#"{"status":"ok","id":"bot-1"}"#.to_vec()).await;
//!         }
//!     }
//! })).await?;
//!
//! let reply = bus.request("registerAI", b"{}".to_vec(), Duration::from_secs(3)).await?;
//! assert_eq!(reply, br#"{"status":"ok","id":"bot-1"}"#.to_vec());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod message;
pub mod nats;
pub mod subject;
pub mod system;
pub mod traits;

pub use error::BusError;
pub use message::{handler_fn, BusMessage, MessageHandler, SubscriptionId};
pub use nats::NatsBus;
pub use system::{BusStats, LocalBus};
pub use traits::MessageBus;
