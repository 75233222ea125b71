//! Transport layer (WebSocket).
//!
//! Exposes the room upgrade handler and the codec that turns socket frames
//! into envelopes before they reach the session state machine.

pub mod codec;
pub mod ws;
