//! Wire protocol.
//!
//! A room connection exchanges JSON text frames, one envelope per frame.
//! Inbound frames are parsed into [`envelope::InboundEnvelope`], which only
//! reads what a client is allowed to set; outbound frames are full
//! [`envelope::Envelope`] values with server-assigned fields.

pub mod envelope;

pub use envelope::{
    decode_inbound, ChatKind, Envelope, EnvelopeKind, InboundEnvelope, RoomId, UserId,
};
