//! chathub gateway library entry.
//!
//! Wires config, the hub actor, the WebSocket transport, and the chat
//! collaborators into a servable router. Consumed by the binary (`main.rs`)
//! and by integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod router;
pub mod services;
pub mod transport;
