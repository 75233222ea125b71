use std::fmt;
use std::sync::Arc;

use axum::extract::ws::Message;

use chathub_core::error::{ChatHubError, ErrorCode, Result};
use chathub_core::protocol::Envelope;

/// Envelope serialized once, shared by every queue it is fanned out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMsg(Arc<str>);

impl PreparedMsg {
    pub fn prepare(env: &Envelope) -> Result<Self> {
        Ok(Self(Arc::from(env.encode()?)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse back into an envelope (diagnostics and tests).
    pub fn decode(&self) -> Result<Envelope> {
        serde_json::from_str(&self.0)
            .map_err(|e| ChatHubError::Internal(format!("prepared frame is not an envelope: {e}")))
    }

    /// Convert to axum::ws::Message for transport.
    /// NOTE: axum 0.7 text frames own a `String`, so each write copies the shared text.
    pub fn to_ws_message(&self) -> Message {
        Message::Text(self.0.to_string())
    }
}

/// Why a connection left the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client closed the socket or the stream ended.
    Normal,
    /// Terminal error on this connection.
    Error(ErrorCode),
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Normal => "NORMAL",
            CloseReason::Error(code) => code.as_str(),
        }
    }
}

impl From<&ChatHubError> for CloseReason {
    fn from(e: &ChatHubError) -> Self {
        CloseReason::Error(e.code())
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of hub state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    /// Registered connections.
    pub connections: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
    /// Sum of room sizes; always equal to `connections`.
    pub room_memberships: usize,
}
