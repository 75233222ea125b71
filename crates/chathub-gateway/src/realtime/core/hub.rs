//! The hub: single owner of connection and room-membership state.
//!
//! All mutation happens inside [`Hub::run`], one command at a time, in intake
//! order. Connections talk to it only through a [`HubHandle`]. The loop never
//! awaits anything but its intake, so a slow socket or a slow persister can't
//! delay fan-out to anyone else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;

use chathub_core::error::{ChatHubError, ErrorCode, Result};
use chathub_core::protocol::{Envelope, RoomId};

use crate::obs::metrics::GatewayMetrics;
use crate::realtime::types::{CloseReason, HubStats, PreparedMsg};

use super::connection::{ConnectionHandle, ConnectionId};
use super::room_index::RoomIndex;

enum HubCommand {
    Register(ConnectionHandle),
    Unregister { id: ConnectionId, reason: CloseReason },
    BroadcastRoom { room: RoomId, msg: PreparedMsg },
    BroadcastAll { msg: PreparedMsg },
    RoomMembers { room: RoomId, reply: oneshot::Sender<Vec<ConnectionId>> },
    Stats { reply: oneshot::Sender<HubStats> },
}

/// Cloneable intake of the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn submit(&self, cmd: HubCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| ChatHubError::Internal("hub stopped".into()))
    }

    /// Admit an authenticated connection to its room.
    pub async fn register(&self, conn: ConnectionHandle) -> Result<()> {
        self.submit(HubCommand::Register(conn)).await
    }

    /// Remove a connection and close its outbound queue. Idempotent.
    pub async fn unregister(&self, id: ConnectionId, reason: CloseReason) {
        // A stopped hub has already dropped every queue; nothing left to do.
        let _ = self.submit(HubCommand::Unregister { id, reason }).await;
    }

    /// Fan an envelope out to every connection currently in `room`.
    pub async fn broadcast_to_room(&self, room: RoomId, env: &Envelope) -> Result<()> {
        let msg = PreparedMsg::prepare(env)?;
        self.submit(HubCommand::BroadcastRoom { room, msg }).await
    }

    /// Fan an envelope out to every registered connection in every room.
    ///
    /// Administrative use only; chat traffic always goes through
    /// [`HubHandle::broadcast_to_room`].
    pub async fn broadcast_all(&self, env: &Envelope) -> Result<()> {
        let msg = PreparedMsg::prepare(env)?;
        self.submit(HubCommand::BroadcastAll { msg }).await
    }

    pub async fn room_members(&self, room: RoomId) -> Result<Vec<ConnectionId>> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::RoomMembers { room, reply }).await?;
        rx.await
            .map_err(|_| ChatHubError::Internal("hub dropped reply".into()))
    }

    pub async fn stats(&self) -> Result<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Stats { reply }).await?;
        rx.await
            .map_err(|_| ChatHubError::Internal("hub dropped reply".into()))
    }
}

/// Hub state. Lives inside its own task for the process lifetime.
pub struct Hub {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    rooms: RoomIndex,
    metrics: Arc<GatewayMetrics>,
}

impl Hub {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            connections: HashMap::new(),
            rooms: RoomIndex::new(),
            metrics,
        }
    }

    /// Start the control loop on the current runtime.
    ///
    /// The loop ends once every [`HubHandle`] is dropped; remaining queues are
    /// closed with it.
    pub fn spawn(intake_capacity: usize, metrics: Arc<GatewayMetrics>) -> HubHandle {
        let (tx, rx) = mpsc::channel(intake_capacity.max(1));
        tokio::spawn(Hub::new(metrics).run(rx));
        HubHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.apply(cmd);
        }
        tracing::info!(connections = self.connections.len(), "hub stopped");
    }

    fn apply(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(conn) => self.register(conn),
            HubCommand::Unregister { id, reason } => self.unregister(id, reason),
            HubCommand::BroadcastRoom { room, msg } => self.broadcast_to_room(room, msg),
            HubCommand::BroadcastAll { msg } => self.broadcast_all(msg),
            HubCommand::RoomMembers { room, reply } => {
                let _ = reply.send(self.rooms.members(room));
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn register(&mut self, conn: ConnectionHandle) {
        let (id, room, user) = (conn.id(), conn.room(), conn.user_id());

        if let Some(stale) = self.connections.insert(id, conn) {
            // Callers register once; a repeat replaces the entry and closes the old queue.
            tracing::warn!(conn = %id, room, stale_room = stale.room(), "connection registered twice");
            self.rooms.leave(stale.room(), id);
        } else {
            self.metrics.connections_active.inc();
            tracing::info!(conn = %id, room, user, "joined room");
        }
        self.rooms.join(room, id);
    }

    fn unregister(&mut self, id: ConnectionId, reason: CloseReason) {
        // Dropping the removed handle drops the queue's only sender.
        let Some(conn) = self.connections.remove(&id) else { return; };
        self.rooms.leave(conn.room(), id);
        self.metrics.connections_active.dec();
        tracing::info!(conn = %id, room = conn.room(), user = conn.user_id(), %reason, "left room");
    }

    fn broadcast_to_room(&mut self, room: RoomId, msg: PreparedMsg) {
        self.metrics.broadcasts.inc(&[("scope", "room")]);
        for id in self.rooms.members(room) {
            self.deliver(id, &msg);
        }
    }

    fn broadcast_all(&mut self, msg: PreparedMsg) {
        self.metrics.broadcasts.inc(&[("scope", "all")]);
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            self.deliver(id, &msg);
        }
    }

    /// Try-send or evict.
    fn deliver(&mut self, id: ConnectionId, msg: &PreparedMsg) {
        let Some(conn) = self.connections.get(&id) else { return; };
        match conn.try_send(msg.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn = %id, room = conn.room(), "outbound queue full, evicting");
                self.metrics.evictions.inc();
                self.unregister(id, CloseReason::Error(ErrorCode::Evicted));
            }
            Err(TrySendError::Closed(_)) => {
                // Outbound pump already gone (write failure); its reader will follow.
                self.unregister(id, CloseReason::Error(ErrorCode::Transport));
            }
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            rooms: self.rooms.room_count(),
            room_memberships: self.rooms.membership_count(),
        }
    }
}
