//! Realtime runtime for the chathub gateway.
//!
//! The hub owns room membership and fan-out; connections reach it only by
//! message passing through a `HubHandle`.

pub mod core;
pub mod types;

pub use core::{outbound_queue, ConnectionHandle, ConnectionId, Hub, HubHandle, OutboundRx, OutboundTx};
pub use types::{CloseReason, HubStats, PreparedMsg};
