//! Realtime core: the hub actor and what it keeps track of.

mod connection;
mod hub;
mod room_index;

pub use connection::{outbound_queue, ConnectionHandle, ConnectionId, OutboundRx, OutboundTx};
pub use hub::{Hub, HubHandle};
pub use room_index::RoomIndex;
