//! Per-connection protocol state machine.
//!
//! A [`BotSession`] owns one transport. Its receive loop reads a line, turns
//! it into at most one bus request according to the current [`Phase`], and
//! writes exactly one [`Reply`] back. Backend pushes for the bot arrive on bus
//! dispatch tasks and are written straight to the transport; those callbacks
//! never look at the session's state.

use super::state::{ConnectionState, Phase};
use crate::config::SessionSettings;
use crate::error::ProtocolError;
use crate::messaging::subjects;
use crate::messaging::types::{
    message_type, push_line, ActionForward, ActionRequest, BackendReply, JoinForward, JoinGame, PushKind,
    RegisterMessage, Reply, UnregisterNotice, ACTION_TYPE, JOIN_TYPE, REGISTER_TYPE,
};
use crate::transport::{ConnectionId, Transport, TransportError, TransportKind};
use arena_bus::subject::is_single_token;
use arena_bus::{handler_fn, BusMessage, MessageBus, MessageHandler, SubscriptionId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What a finished session looked like, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub connection_id: ConnectionId,
    pub transport: TransportKind,
    pub bot_id: Option<String>,
    pub game_id: Option<String>,
    pub lines_processed: u64,
    pub final_state: ConnectionState,
}

/// The state machine driving one bot connection.
pub struct BotSession {
    transport: Arc<dyn Transport>,
    bus: Arc<dyn MessageBus>,
    settings: SessionSettings,
    phase: Phase,
    subscriptions: Vec<SubscriptionId>,
    lines_processed: u64,
    /// Identifiers the session had when it was torn down
    last_phase: Phase,
}

impl BotSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        bus: Arc<dyn MessageBus>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            transport,
            bus,
            settings,
            phase: Phase::Unregistered,
            subscriptions: Vec::new(),
            lines_processed: 0,
            last_phase: Phase::Unregistered,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.transport.id()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn state(&self) -> ConnectionState {
        self.phase.state()
    }

    /// Runs the receive loop until the transport fails or is closed, then
    /// tears the session down.
    pub async fn run(mut self) -> SessionSummary {
        let id = self.id();
        debug!("🤖 Session {} started ({})", id, self.transport.kind());

        loop {
            let line = match self.transport.read_line().await {
                Ok(line) => line,
                Err(TransportError::Closed) => {
                    debug!("Session {} transport closed", id);
                    break;
                }
                Err(e) => {
                    warn!("Session {} read failed: {}", id, e);
                    break;
                }
            };

            if let Err(e) = self.handle_line(&line).await {
                warn!("Session {} could not write reply: {}", id, e);
                break;
            }
        }

        self.close().await;
        self.summary()
    }

    /// Processes one client line and writes its reply.
    ///
    /// Protocol problems become an error reply and leave the state
    /// unchanged. Only a failed write is returned as an error; the caller is
    /// expected to tear the session down.
    pub async fn handle_line(&mut self, line: &str) -> Result<Reply, TransportError> {
        let outcome = match self.phase.state() {
            ConnectionState::Unregistered => self.register(line).await,
            ConnectionState::Registered => self.join(line).await,
            ConnectionState::Joined => self.act(line).await,
            ConnectionState::Closed => return Err(TransportError::Closed),
        };
        self.lines_processed += 1;

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                debug!(
                    "Session {} rejected line in state {}: {}",
                    self.id(),
                    self.phase.state(),
                    e
                );
                Reply::error(self.phase.bot_id().unwrap_or_default(), e.to_string())
            }
        };

        self.transport.write_line(&reply.to_line()).await?;
        Ok(reply)
    }

    async fn register(&mut self, line: &str) -> Result<Reply, ProtocolError> {
        let message: RegisterMessage = decode(line, REGISTER_TYPE)?;
        if message.team_id.trim().is_empty() {
            return Err(ProtocolError::EmptyField("teamId"));
        }

        let forward = RegisterMessage {
            kind: REGISTER_TYPE.to_string(),
            ..message
        };
        let reply = self.request(subjects::REGISTER, &forward).await?;

        let bot_id = reply.id;
        if !is_single_token(&bot_id) {
            return Err(ProtocolError::BadBackendReply(format!(
                "unusable bot id '{bot_id}'"
            )));
        }

        if let Err(e) = self.subscribe_bot(&bot_id).await {
            self.unsubscribe_all().await;
            self.publish_unregister(&bot_id).await;
            return Err(e);
        }

        self.transition(Phase::Registered {
            bot_id: bot_id.clone(),
        });
        info!(
            "🤖 Connection {} registered bot {} for team {}",
            self.id(),
            bot_id,
            forward.team_id
        );
        Ok(Reply::ok(bot_id))
    }

    async fn join(&mut self, line: &str) -> Result<Reply, ProtocolError> {
        let message: JoinGame = decode(line, JOIN_TYPE)?;
        if message.game_id.is_empty() {
            return Err(ProtocolError::EmptyField("gameId"));
        }
        if !is_single_token(&message.game_id) {
            return Err(ProtocolError::InvalidGameId(message.game_id));
        }

        let bot_id = self.phase.bot_id().unwrap_or_default().to_string();
        let forward = JoinForward {
            kind: JOIN_TYPE,
            bot_id: &bot_id,
            game_id: &message.game_id,
        };
        self.request(&subjects::join(&message.game_id), &forward)
            .await?;

        info!("🎮 Bot {} joined game {}", bot_id, message.game_id);
        self.transition(Phase::Joined {
            bot_id,
            game_id: message.game_id.clone(),
        });
        Ok(Reply::ok(message.game_id))
    }

    async fn act(&mut self, line: &str) -> Result<Reply, ProtocolError> {
        let action: ActionRequest = decode(line, ACTION_TYPE)?;
        let (bot_id, game_id) = match &self.phase {
            Phase::Joined { bot_id, game_id } => (bot_id.clone(), game_id.clone()),
            _ => return Err(ProtocolError::Closed),
        };

        let forward = ActionForward {
            kind: ACTION_TYPE,
            bot_id: &bot_id,
            direction: action.direction,
            extra: &action.extra,
        };
        self.request(&subjects::action(&game_id), &forward).await?;

        trace!("Bot {} acted in game {}", bot_id, game_id);
        Ok(Reply::ok(bot_id))
    }

    /// Sends a request and insists on an `ok` answer.
    async fn request<T: Serialize>(
        &self,
        subject: &str,
        body: &T,
    ) -> Result<BackendReply, ProtocolError> {
        let payload =
            serde_json::to_vec(body).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let raw = self
            .bus
            .request(subject, payload, self.settings.request_timeout())
            .await?;

        let reply: BackendReply = serde_json::from_slice(&raw)
            .map_err(|e| ProtocolError::BadBackendReply(e.to_string()))?;
        if reply.is_ok() {
            Ok(reply)
        } else {
            Err(ProtocolError::Rejected(reply.reason().to_string()))
        }
    }

    async fn subscribe_bot(&mut self, bot_id: &str) -> Result<(), ProtocolError> {
        for subject in subjects::bot_subjects(bot_id) {
            let handler = push_handler(bot_id, self.transport.clone(), self.bus.clone());
            let id = self.bus.subscribe(&subject, handler).await?;
            self.subscriptions.push(id);
        }
        Ok(())
    }

    async fn unsubscribe_all(&mut self) {
        for id in self.subscriptions.drain(..) {
            if let Err(e) = self.bus.unsubscribe(id).await {
                debug!("Failed to drop subscription {}: {}", id, e);
            }
        }
    }

    async fn publish_unregister(&self, bot_id: &str) {
        let notice = UnregisterNotice {
            bot_id: bot_id.to_string(),
        };
        let payload = match serde_json::to_vec(&notice) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode unregister notice: {}", e);
                return;
            }
        };
        match self.bus.publish(subjects::UNREGISTER, payload).await {
            Ok(()) => debug!("📤 Published unregister for bot {}", bot_id),
            Err(e) => warn!("Failed to unregister bot {}: {}", bot_id, e),
        }
    }

    fn transition(&mut self, next: Phase) {
        debug_assert!(self.phase.state().can_transition_to(next.state()));
        trace!(
            "Session {} {} -> {}",
            self.id(),
            self.phase.state(),
            next.state()
        );
        self.phase = next;
    }

    /// Tears the session down: drops the bot's subscriptions, closes the
    /// transport and tells the backend the bot left. Runs once; later calls
    /// do nothing.
    pub async fn close(&mut self) {
        if self.phase.state().is_terminal() {
            return;
        }
        let previous = std::mem::replace(&mut self.phase, Phase::Closed);

        self.unsubscribe_all().await;
        self.transport.close().await;
        if let Some(bot_id) = previous.bot_id() {
            self.publish_unregister(bot_id).await;
        }

        info!(
            "❌ Connection {} closed ({} line(s), last state {})",
            self.id(),
            self.lines_processed,
            previous.state()
        );
        self.last_phase = previous;
    }

    pub fn summary(&self) -> SessionSummary {
        let phase = if self.phase.state().is_terminal() {
            &self.last_phase
        } else {
            &self.phase
        };
        SessionSummary {
            connection_id: self.id(),
            transport: self.transport.kind(),
            bot_id: phase.bot_id().map(str::to_string),
            game_id: phase.game_id().map(str::to_string),
            lines_processed: self.lines_processed,
            final_state: self.phase.state(),
        }
    }
}

/// Parses a client line, rejecting a `type` that names another message.
fn decode<T: DeserializeOwned>(line: &str, expected: &'static str) -> Result<T, ProtocolError> {
    if let Some(found) = message_type(line.as_bytes()) {
        if !found.eq_ignore_ascii_case(expected) {
            return Err(ProtocolError::UnexpectedType { expected, found });
        }
    }
    serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn push_handler(
    bot_id: &str,
    transport: Arc<dyn Transport>,
    bus: Arc<dyn MessageBus>,
) -> MessageHandler {
    let bot_id = bot_id.to_string();
    handler_fn(move |message: BusMessage| {
        let bot_id = bot_id.clone();
        let transport = transport.clone();
        let bus = bus.clone();
        async move { forward_push(&bot_id, transport.as_ref(), bus.as_ref(), message).await }
    })
}

/// Writes a backend push to the client as one line and acknowledges it when
/// the backend asked for a reply. Pushes that cannot be sent as a single
/// line are dropped and reported in the acknowledgement.
async fn forward_push(
    bot_id: &str,
    transport: &dyn Transport,
    bus: &dyn MessageBus,
    message: BusMessage,
) {
    let kind = PushKind::classify(&message.payload);
    let written = match push_line(&message.payload) {
        Ok(line) => transport.write_line(&line).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    if let Some(reply_to) = &message.reply_to {
        let ack = match &written {
            Ok(()) => Reply::ok(bot_id),
            Err(e) => Reply::error(bot_id, e.to_string()),
        };
        if let Err(e) = bus.publish(reply_to, ack.to_line().into_bytes()).await {
            warn!("Failed to acknowledge push for bot {}: {}", bot_id, e);
        }
    }

    match written {
        Ok(()) if kind.ends_game() => {
            info!("🏁 Game over for bot {}, closing connection", bot_id);
            transport.close().await;
        }
        Ok(()) => trace!("📨 Forwarded {:?} push to bot {}", kind, bot_id),
        Err(e) => debug!("Dropped push for bot {}: {}", bot_id, e),
    }
}
