use std::sync::Arc;
use std::time::Instant;

use chathub_core::error::Result;
use chathub_core::protocol::{ChatKind, Envelope, RoomId};

use crate::obs::metrics::GatewayMetrics;
use crate::realtime::HubHandle;

use super::auth::Identity;
use super::persist::MessagePersister;

/// Persist-then-broadcast for chat and file events.
///
/// At most once: a persistence failure drops the event (no broadcast, no
/// retry); a success is broadcast exactly once, to the whole room including
/// the sender.
#[derive(Clone)]
pub struct ChatService {
    persister: Arc<dyn MessagePersister>,
    hub: HubHandle,
    metrics: Arc<GatewayMetrics>,
}

impl ChatService {
    pub fn new(persister: Arc<dyn MessagePersister>, hub: HubHandle, metrics: Arc<GatewayMetrics>) -> Self {
        Self { persister, hub, metrics }
    }

    pub async fn handle(&self, kind: ChatKind, content: &str, sender: &Identity, room: RoomId) -> Result<()> {
        let started = Instant::now();
        let record = self
            .persister
            .persist(kind, content, sender.user_id, room)
            .await;
        self.metrics.persist_duration.observe(started.elapsed());

        let record = match record {
            Ok(r) => r,
            Err(e) => {
                self.metrics.persist_failures.inc(&[("kind", kind.as_str())]);
                tracing::warn!(room, user = sender.user_id, kind = kind.as_str(), error = %e, "dropping chat event");
                return Err(e.into());
            }
        };

        tracing::debug!(room, id = record.id, kind = kind.as_str(), "persisted");
        let env: Envelope = record.into();
        self.hub.broadcast_to_room(room, &env).await
    }
}
