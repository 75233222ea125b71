//! Shared error type across chathub crates.

use thiserror::Error;

/// Stable error codes, used as log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Invalid configuration or request input.
    BadRequest,
    /// Malformed frame, unknown kind, or non-auth first frame.
    ProtocolViolation,
    /// Bad or expired credential.
    AuthFailed,
    /// The message persister rejected or failed an event.
    PersistenceFailed,
    /// Read/write error on the underlying socket.
    Transport,
    /// Read deadline or write deadline exceeded.
    Timeout,
    /// Removed by the hub because the outbound queue was full.
    Evicted,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::ProtocolViolation => "PROTOCOL_VIOLATION",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::PersistenceFailed => "PERSISTENCE_FAILED",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Evicted => "EVICTED",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ChatHubError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum ChatHubError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("auth failed: {0}")]
    AuthFailed(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("deadline exceeded")]
    Timeout,
    #[error("evicted: outbound queue full")]
    Evicted,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl ChatHubError {
    /// Map to the stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChatHubError::BadRequest(_) => ErrorCode::BadRequest,
            ChatHubError::ProtocolViolation(_) => ErrorCode::ProtocolViolation,
            ChatHubError::AuthFailed(_) => ErrorCode::AuthFailed,
            ChatHubError::Persistence(_) => ErrorCode::PersistenceFailed,
            ChatHubError::Transport(_) => ErrorCode::Transport,
            ChatHubError::Timeout => ErrorCode::Timeout,
            ChatHubError::Evicted => ErrorCode::Evicted,
            ChatHubError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            ChatHubError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error ends the connection it occurred on.
    ///
    /// Persistence failures drop a single event; everything else is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatHubError::Persistence(_))
    }
}
