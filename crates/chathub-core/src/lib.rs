//! chathub core: wire contracts and the shared error surface.
//!
//! This crate defines the chat envelope exchanged over a room connection and
//! the error taxonomy used by the gateway. It carries no transport or runtime
//! dependencies so the wire format can be reused by clients and tooling.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed client input always surfaces as `ChatHubError::ProtocolViolation`
//! so a hostile peer can only close its own connection.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ChatHubError, ErrorCode, Result};
