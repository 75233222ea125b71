use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use chathub_core::protocol::{RoomId, UserId};

use crate::realtime::types::PreparedMsg;
use crate::services::Identity;

/// Producer side of a connection's outbound queue.
pub type OutboundTx = mpsc::Sender<PreparedMsg>;
/// Consumer side, drained only by the connection's outbound pump.
pub type OutboundRx = mpsc::Receiver<PreparedMsg>;

/// Bounded outbound queue for one connection.
pub fn outbound_queue(capacity: usize) -> (OutboundTx, OutboundRx) {
    mpsc::channel(capacity.max(1))
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// An authenticated connection as the hub sees it.
///
/// Only built after a successful handshake, so holding one means the
/// connection is authenticated. The hub keeps the only sender of the outbound
/// queue; dropping the handle closes the queue.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    room: RoomId,
    identity: Identity,
    tx: OutboundTx,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, room: RoomId, identity: Identity, tx: OutboundTx) -> Self {
        Self { id, room, identity, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
    pub fn room(&self) -> RoomId {
        self.room
    }
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Non-blocking enqueue.
    pub(crate) fn try_send(&self, msg: PreparedMsg) -> Result<(), mpsc::error::TrySendError<PreparedMsg>> {
        self.tx.try_send(msg)
    }
}
