//! External collaborators of the hub and the chat pipeline built on them.
//!
//! - `auth`: in-band credential validation (`TokenValidator`)
//! - `persist`: durable storage of chat/file events (`MessagePersister`)
//! - `chat`: persist-then-broadcast for authenticated connections

pub mod auth;
pub mod chat;
pub mod persist;

pub use auth::{AuthError, Identity, JwtValidator, TokenValidator};
pub use chat::ChatService;
pub use persist::{InMemoryPersister, MessagePersister, PersistError, PersistedRecord};
