//! Shared application state for the chathub gateway.
//!
//! Collaborators are chosen once here; connections only ever see the trait
//! objects. Construction spawns the hub loop, so it must run inside a tokio
//! runtime.

use std::sync::Arc;

use chathub_core::error::Result;

use crate::config::GatewayConfig;
use crate::obs::metrics::GatewayMetrics;
use crate::realtime::{Hub, HubHandle};
use crate::services::{ChatService, InMemoryPersister, JwtValidator, MessagePersister, TokenValidator};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    hub: HubHandle,
    validator: Arc<dyn TokenValidator>,
    chat: ChatService,
    metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Default wiring: JWT validation and the in-memory message store seeded
    /// from `directory`.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        let validator = Arc::new(JwtValidator::from_config(&cfg.auth));
        let persister = Arc::new(InMemoryPersister::from_directory(&cfg.directory));
        tracing::info!(
            users = cfg.directory.users.len(),
            rooms = cfg.directory.rooms.len(),
            "using in-memory message store"
        );
        Self::with_collaborators(cfg, validator, persister)
    }

    pub fn with_collaborators(
        cfg: GatewayConfig,
        validator: Arc<dyn TokenValidator>,
        persister: Arc<dyn MessagePersister>,
    ) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(GatewayMetrics::default());
        let hub = Hub::spawn(cfg.gateway.hub_queue_capacity, Arc::clone(&metrics));
        let chat = ChatService::new(persister, hub.clone(), Arc::clone(&metrics));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                hub,
                validator,
                chat,
                metrics,
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn hub(&self) -> &HubHandle {
        &self.inner.hub
    }

    pub fn validator(&self) -> &dyn TokenValidator {
        self.inner.validator.as_ref()
    }

    pub fn chat(&self) -> &ChatService {
        &self.inner.chat
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.inner.metrics
    }
}
