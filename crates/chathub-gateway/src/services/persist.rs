//! Message persistence collaborator.
//!
//! The relational store is outside this crate; `InMemoryPersister` keeps the
//! same validation rules (non-empty content, known user, known room) so the
//! gateway runs standalone and tests can observe what was stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use chathub_core::error::ChatHubError;
use chathub_core::protocol::{ChatKind, Envelope, RoomId, UserId};

use crate::config::DirectorySection;

/// A stored chat event, enriched with server-assigned fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub id: u64,
    pub kind: ChatKind,
    pub content: String,
    pub user_id: UserId,
    pub username: String,
    pub room_id: RoomId,
    pub created_at: DateTime<Utc>,
}

impl From<PersistedRecord> for Envelope {
    fn from(r: PersistedRecord) -> Self {
        Envelope::chat(r.kind, r.content, r.user_id, r.username, r.room_id, r.created_at)
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{} content is required", .0.as_str())]
    EmptyContent(ChatKind),
    #[error("user not found: {0}")]
    UnknownUser(UserId),
    #[error("chat room not found: {0}")]
    UnknownRoom(RoomId),
    #[error("store: {0}")]
    Store(String),
}

impl From<PersistError> for ChatHubError {
    fn from(e: PersistError) -> Self {
        ChatHubError::Persistence(e.to_string())
    }
}

#[async_trait]
pub trait MessagePersister: Send + Sync {
    async fn persist(
        &self,
        kind: ChatKind,
        content: &str,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<PersistedRecord, PersistError>;
}

/// Process-local message store.
pub struct InMemoryPersister {
    users: DashMap<UserId, String>,
    rooms: DashMap<RoomId, ()>,
    records: Mutex<Vec<PersistedRecord>>,
    next_id: AtomicU64,
}

impl InMemoryPersister {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            rooms: DashMap::new(),
            records: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_directory(dir: &DirectorySection) -> Self {
        let store = Self::new();
        for u in &dir.users {
            store.add_user(u.id, u.username.clone());
        }
        for r in &dir.rooms {
            store.add_room(*r);
        }
        store
    }

    pub fn add_user(&self, id: UserId, username: impl Into<String>) {
        self.users.insert(id, username.into());
    }

    pub fn add_room(&self, id: RoomId) {
        self.rooms.insert(id, ());
    }

    /// Most recent records of a room, oldest first.
    pub fn recent(&self, room_id: RoomId, limit: usize) -> Vec<PersistedRecord> {
        let Ok(records) = self.records.lock() else { return vec![]; };
        let mut out: Vec<PersistedRecord> = records
            .iter()
            .rev()
            .filter(|r| r.room_id == room_id)
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    pub fn count(&self, room_id: RoomId) -> usize {
        self.records
            .lock()
            .map(|r| r.iter().filter(|m| m.room_id == room_id).count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryPersister {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePersister for InMemoryPersister {
    async fn persist(
        &self,
        kind: ChatKind,
        content: &str,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<PersistedRecord, PersistError> {
        if content.is_empty() {
            return Err(PersistError::EmptyContent(kind));
        }
        let username = self
            .users
            .get(&user_id)
            .map(|u| u.value().clone())
            .ok_or(PersistError::UnknownUser(user_id))?;
        if !self.rooms.contains_key(&room_id) {
            return Err(PersistError::UnknownRoom(room_id));
        }

        let record = PersistedRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            content: content.to_string(),
            user_id,
            username,
            room_id,
            created_at: Utc::now(),
        };

        // Poisoned lock means a panic elsewhere; report instead of propagating it.
        let mut records = self
            .records
            .lock()
            .map_err(|_| PersistError::Store("record store poisoned".into()))?;
        records.push(record.clone());
        Ok(record)
    }
}
