use std::collections::{BTreeSet, HashMap};

use chathub_core::protocol::RoomId;

use super::connection::ConnectionId;

/// Room membership: room -> connections. Owned by the hub loop, never shared.
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: HashMap<RoomId, BTreeSet<ConnectionId>>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, room: RoomId, conn: ConnectionId) {
        self.rooms.entry(room).or_default().insert(conn);
    }

    /// Remove membership; empty rooms are dropped.
    pub fn leave(&mut self, room: RoomId, conn: ConnectionId) -> bool {
        let Some(set) = self.rooms.get_mut(&room) else { return false; };
        let removed = set.remove(&conn);
        if set.is_empty() {
            self.rooms.remove(&room);
        }
        removed
    }

    /// Members in ascending id order (join order, since ids are monotonic).
    pub fn members(&self, room: RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(&room)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn membership_count(&self) -> usize {
        self.rooms.values().map(BTreeSet::len).sum()
    }
}
