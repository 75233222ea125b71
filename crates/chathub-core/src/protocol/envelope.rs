//! Chat envelope (JSON text frame).
//!
//! Wire schema:
//! `{"type", "content", "user_id", "username", "chat_room_id", "timestamp", "token"}`.
//! Author fields and the timestamp are only ever set by the server; on inbound
//! frames they are ignored rather than rejected so clients may echo them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChatHubError, Result};

/// Numeric user identifier.
pub type UserId = u64;
/// Numeric room identifier.
pub type RoomId = u64;

/// Content of the acknowledgement sent after a successful handshake.
pub const AUTH_ACK_CONTENT: &str = "Authentication successful";

/// Closed set of envelope kinds. Anything else fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Auth,
    AuthAck,
    Message,
    File,
    Ping,
    Pong,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Auth => "auth",
            EnvelopeKind::AuthAck => "auth_ack",
            EnvelopeKind::Message => "message",
            EnvelopeKind::File => "file",
            EnvelopeKind::Ping => "ping",
            EnvelopeKind::Pong => "pong",
        }
    }

    /// The persistable variant of this kind, if any.
    pub fn chat_kind(self) -> Option<ChatKind> {
        match self {
            EnvelopeKind::Message => Some(ChatKind::Message),
            EnvelopeKind::File => Some(ChatKind::File),
            _ => None,
        }
    }
}

/// Kinds of chat events that are persisted and fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    /// Plain chat text.
    Message,
    /// File reference string.
    File,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Message => "message",
            ChatKind::File => "file",
        }
    }
}

impl From<ChatKind> for EnvelopeKind {
    fn from(kind: ChatKind) -> Self {
        match kind {
            ChatKind::Message => EnvelopeKind::Message,
            ChatKind::File => EnvelopeKind::File,
        }
    }
}

/// Client-to-server envelope. Only the fields a client may set are read.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    /// Envelope kind (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Chat text or file reference.
    #[serde(default)]
    pub content: String,
    /// Credential, only meaningful on `auth`.
    #[serde(default)]
    pub token: Option<String>,
}

/// Parse one inbound text frame.
pub fn decode_inbound(frame: &str) -> Result<InboundEnvelope> {
    serde_json::from_str(frame)
        .map_err(|e| ChatHubError::ProtocolViolation(format!("invalid envelope: {e}")))
}

/// Server-to-client envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Envelope {
    /// Handshake acknowledgement addressed to the freshly authenticated user.
    pub fn auth_ack(room: RoomId, user_id: UserId, username: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: EnvelopeKind::AuthAck,
            content: AUTH_ACK_CONTENT.to_string(),
            user_id: Some(user_id),
            username: Some(username.to_string()),
            chat_room_id: Some(room),
            timestamp: Some(at),
            token: None,
        }
    }

    /// A persisted chat event as fanned out to a room.
    pub fn chat(
        kind: ChatKind,
        content: String,
        user_id: UserId,
        username: String,
        room: RoomId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            content,
            user_id: Some(user_id),
            username: Some(username),
            chat_room_id: Some(room),
            timestamp: Some(at),
            token: None,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ChatHubError::Internal(format!("envelope encode failed: {e}")))
    }
}
