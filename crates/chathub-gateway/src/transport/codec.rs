//! Decode-once codec for the transport layer.
//!
//! - Text frames => InboundEnvelope
//! - Binary frames => protocol violation (the chat protocol is text-only)
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use chathub_core::{
    error::{ChatHubError, Result},
    protocol::{decode_inbound, InboundEnvelope},
};

#[derive(Debug)]
pub enum Inbound {
    Envelope(InboundEnvelope),
    Ping,
    Pong,
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => Ok(Inbound::Envelope(decode_inbound(&s)?)),
        Message::Binary(b) => Err(ChatHubError::ProtocolViolation(format!(
            "binary frame ({} bytes) not supported",
            b.len()
        ))),
        Message::Ping(_) => Ok(Inbound::Ping),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
