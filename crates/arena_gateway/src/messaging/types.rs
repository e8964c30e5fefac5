//! Message type definitions for bot-gateway communication.
//!
//! Every message on the wire is a single JSON object. Client messages carry an
//! optional `type` discriminant; the gateway decides what it expects from the
//! connection's current state and only uses `type` to reject messages that
//! clearly belong somewhere else.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Discriminant the gateway stamps on every registration it forwards.
pub const REGISTER_TYPE: &str = "registerAi";
/// Discriminant of join messages.
pub const JOIN_TYPE: &str = "joinGame";
/// Discriminant of in-game actions.
pub const ACTION_TYPE: &str = "action";
/// Discriminant of every reply written to clients.
pub const REPLY_TYPE: &str = "reply";

/// First message a bot sends: announces its team.
///
/// ```json
/// {"type": "registerAi", "teamId": "T1", "version": "1.0"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub team_id: String,
    #[serde(default)]
    pub version: String,
}

/// Request to join a game, valid once registered.
///
/// ```json
/// {"gameId": "G1"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGame {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub game_id: String,
}

/// Movement vector of an action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub x: f64,
    pub y: f64,
}

/// In-game action. Fields beyond `direction` are kept and forwarded as-is,
/// so games can define richer actions without gateway changes.
///
/// ```json
/// {"type": "action", "direction": {"x": 1.0, "y": 0.0}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub direction: Direction,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Join payload published on `<gameId>.join`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinForward<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub bot_id: &'a str,
    pub game_id: &'a str,
}

/// Action payload published on `<gameId>.action`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionForward<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub bot_id: &'a str,
    pub direction: Direction,
    #[serde(flatten)]
    pub extra: &'a Map<String, Value>,
}

/// Payload of the `unregisterAI` publish sent when a registered bot leaves.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterNotice {
    pub bot_id: String,
}

/// Reply the backend sends to registration, join and action requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendReply {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub error: String,
}

impl BackendReply {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Human readable reason for a rejection.
    pub fn reason(&self) -> &str {
        if self.error.is_empty() {
            "no reason given"
        } else {
            &self.error
        }
    }
}

/// Outcome reported in a [`Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Answer the gateway writes to a client for every line it processes.
///
/// ```json
/// {"type": "reply", "status": "ok", "id": "bot-42"}
/// {"type": "reply", "status": "error", "error": "malformed message: ..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            kind: REPLY_TYPE.to_string(),
            status: ReplyStatus::Ok,
            id: id.into(),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: REPLY_TYPE.to_string(),
            status: ReplyStatus::Error,
            id: id.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Serialized single-line form.
    pub fn to_line(&self) -> String {
        // A struct of strings and unit enums always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Classification of a backend push by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushKind {
    GameStart,
    GameState,
    GameEnd,
    JoinRequest,
    Other(String),
    /// Not a JSON object, or no `type` field
    Untyped,
}

impl PushKind {
    pub fn classify(payload: &[u8]) -> Self {
        match message_type(payload).as_deref() {
            Some("gameStart") => PushKind::GameStart,
            Some("gameState") => PushKind::GameState,
            Some("gameEnd") => PushKind::GameEnd,
            Some("joinRequest") => PushKind::JoinRequest,
            Some(other) => PushKind::Other(other.to_string()),
            None => PushKind::Untyped,
        }
    }

    /// True for the push that finishes the bot's game and its connection.
    pub fn ends_game(&self) -> bool {
        matches!(self, PushKind::GameEnd)
    }
}

#[derive(Deserialize)]
struct Discriminant {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Extracts the `type` discriminant of a JSON object, if any.
pub fn message_type(raw: &[u8]) -> Option<String> {
    serde_json::from_slice::<Discriminant>(raw)
        .ok()
        .and_then(|d| d.kind)
}

/// Turns a backend push into exactly one client line.
///
/// Payloads are passed through untouched unless they contain a line break;
/// those are compacted through `serde_json` and rejected when they are not
/// JSON. Invalid UTF-8 is rejected rather than altered.
pub fn push_line(raw: &[u8]) -> Result<Cow<'_, str>, ProtocolError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ProtocolError::BadBackendReply("push payload is not valid UTF-8".to_string()))?;
    if !text.contains(['\n', '\r']) {
        return Ok(Cow::Borrowed(text));
    }

    let value: Value = serde_json::from_str(text).map_err(|_| {
        ProtocolError::BadBackendReply("push payload spans several lines".to_string())
    })?;
    serde_json::to_string(&value)
        .map(Cow::Owned)
        .map_err(|e| ProtocolError::BadBackendReply(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_message_parsing() {
        let msg: RegisterMessage =
            serde_json::from_str(r#"{"type":"registerAi","teamId":"T1","version":"1.0"}"#)
                .unwrap();
        assert_eq!(msg.kind, "registerAi");
        assert_eq!(msg.team_id, "T1");
        assert_eq!(msg.version, "1.0");

        // type and version are optional
        let msg: RegisterMessage = serde_json::from_str(r#"{"teamId":"T2"}"#).unwrap();
        assert_eq!(msg.kind, "");
        assert_eq!(msg.version, "");

        // teamId is not
        assert!(serde_json::from_str::<RegisterMessage>(r#"{"gameId":"G1"}"#).is_err());
    }

    #[test]
    fn test_success_reply_wire_format() {
        assert_eq!(
            Reply::ok("bot-42").to_line(),
            r#"{"type":"reply","status":"ok","id":"bot-42"}"#
        );
    }

    #[test]
    fn test_error_reply_wire_format() {
        assert_eq!(
            Reply::error("", "full").to_line(),
            r#"{"type":"reply","status":"error","error":"full"}"#
        );
        assert_eq!(
            Reply::error("bot-1", "full").to_line(),
            r#"{"type":"reply","status":"error","id":"bot-1","error":"full"}"#
        );
    }

    #[test]
    fn test_backend_reply() {
        let reply: BackendReply = serde_json::from_str(r#"{"status":"ok","id":"bot-42"}"#).unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.id, "bot-42");

        let reply: BackendReply =
            serde_json::from_str(r#"{"status":"error","error":"full"}"#).unwrap();
        assert!(!reply.is_ok());
        assert_eq!(reply.reason(), "full");

        let reply: BackendReply = serde_json::from_str(r#"{"status":"nope"}"#).unwrap();
        assert_eq!(reply.reason(), "no reason given");

        assert!(serde_json::from_str::<BackendReply>(r#"{"id":"x"}"#).is_err());
    }

    #[test]
    fn test_action_keeps_extra_fields() {
        let action: ActionRequest = serde_json::from_str(
            r#"{"type":"action","direction":{"x":1.0,"y":-0.5},"boost":true}"#,
        )
        .unwrap();
        assert_eq!(action.direction, Direction { x: 1.0, y: -0.5 });

        let forward = ActionForward {
            kind: ACTION_TYPE,
            bot_id: "bot-1",
            direction: action.direction,
            extra: &action.extra,
        };
        let value = serde_json::to_value(&forward).unwrap();
        assert_eq!(value["type"], "action");
        assert_eq!(value["botId"], "bot-1");
        assert_eq!(value["direction"]["y"], -0.5);
        assert_eq!(value["boost"], true);
    }

    #[test]
    fn test_join_forward_shape() {
        let forward = JoinForward {
            kind: JOIN_TYPE,
            bot_id: "bot-1",
            game_id: "G1",
        };
        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            r#"{"type":"joinGame","botId":"bot-1","gameId":"G1"}"#
        );
    }

    #[test]
    fn test_push_classification() {
        assert_eq!(PushKind::classify(br#"{"type":"gameStart"}"#), PushKind::GameStart);
        assert_eq!(PushKind::classify(br#"{"type":"gameState","tick":3}"#), PushKind::GameState);
        assert!(PushKind::classify(br#"{"type":"gameEnd","winner":"T1"}"#).ends_game());
        assert_eq!(PushKind::classify(br#"{"type":"joinRequest"}"#), PushKind::JoinRequest);
        assert_eq!(
            PushKind::classify(br#"{"type":"chat"}"#),
            PushKind::Other("chat".to_string())
        );
        assert_eq!(PushKind::classify(b"[1,2]"), PushKind::Untyped);
        assert_eq!(PushKind::classify(b"not json"), PushKind::Untyped);
    }

    #[test]
    fn test_push_line() {
        let compact = br#"{"type":"gameState","tick":3}"#;
        assert!(matches!(push_line(compact), Ok(Cow::Borrowed(_))));

        let pretty = b"{\n  \"type\": \"gameEnd\",\r\n  \"winner\": \"T1\"\n}\n";
        assert_eq!(
            push_line(pretty).unwrap(),
            r#"{"type":"gameEnd","winner":"T1"}"#
        );

        assert_eq!(
            push_line(b"first\nsecond"),
            Err(ProtocolError::BadBackendReply(
                "push payload spans several lines".to_string()
            ))
        );
        assert!(matches!(
            push_line(b"{\"type\":\"gameState\",\"x\":\"\xff\"}"),
            Err(ProtocolError::BadBackendReply(_))
        ));
    }
}
