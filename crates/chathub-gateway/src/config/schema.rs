use std::time::Duration;

use serde::Deserialize;
use chathub_core::error::{ChatHubError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    pub auth: AuthSection,

    #[serde(default)]
    pub directory: DirectorySection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ChatHubError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.auth.validate()?;
        self.directory.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Keepalive period: how often the outbound pump probes with a ping.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// A connection that sends no ping/pong for this long is dead.
    #[serde(default = "default_read_deadline_ms")]
    pub read_deadline_ms: u64,

    /// Upper bound for a single frame write.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Per-connection outbound queue capacity.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    /// Hub command intake capacity.
    #[serde(default = "default_hub_queue_capacity")]
    pub hub_queue_capacity: usize,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            read_deadline_ms: default_read_deadline_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            send_queue_capacity: default_send_queue_capacity(),
            hub_queue_capacity: default_hub_queue_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=120000).contains(&self.ping_interval_ms) {
            return Err(ChatHubError::BadRequest(
                "gateway.ping_interval_ms must be between 1000 and 120000".into(),
            ));
        }
        if !(2000..=600000).contains(&self.read_deadline_ms) {
            return Err(ChatHubError::BadRequest(
                "gateway.read_deadline_ms must be between 2000 and 600000".into(),
            ));
        }
        if self.read_deadline_ms <= self.ping_interval_ms {
            return Err(ChatHubError::BadRequest(
                "gateway.read_deadline_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if !(100..=60000).contains(&self.write_timeout_ms) {
            return Err(ChatHubError::BadRequest(
                "gateway.write_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if !(1..=65536).contains(&self.send_queue_capacity) {
            return Err(ChatHubError::BadRequest(
                "gateway.send_queue_capacity must be between 1 and 65536".into(),
            ));
        }
        if !(1..=1_048_576).contains(&self.hub_queue_capacity) {
            return Err(ChatHubError::BadRequest(
                "gateway.hub_queue_capacity must be between 1 and 1048576".into(),
            ));
        }
        if !(256..=16_777_216).contains(&self.max_frame_bytes) {
            return Err(ChatHubError::BadRequest(
                "gateway.max_frame_bytes must be between 256 and 16777216".into(),
            ));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    54000
}
fn default_read_deadline_ms() -> u64 {
    60000
}
fn default_write_timeout_ms() -> u64 {
    10000
}
fn default_send_queue_capacity() -> usize {
    256
}
fn default_hub_queue_capacity() -> usize {
    1024
}
fn default_max_frame_bytes() -> usize {
    65536
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// HS256 signing secret shared with the token issuer.
    pub jwt_secret: String,
    /// Expected `iss` claim; not checked when absent.
    #[serde(default)]
    pub issuer: Option<String>,
}

impl AuthSection {
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ChatHubError::BadRequest("auth.jwt_secret must not be empty".into()));
        }
        Ok(())
    }
}

/// Users and rooms known to the in-memory message store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySection {
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
    #[serde(default)]
    pub rooms: Vec<u64>,
}

impl DirectorySection {
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for u in &self.users {
            if u.username.trim().is_empty() {
                return Err(ChatHubError::BadRequest(format!(
                    "directory.users[id={}].username must not be empty",
                    u.id
                )));
            }
            if !seen.insert(u.id) {
                return Err(ChatHubError::BadRequest(format!(
                    "directory.users has duplicate id {}",
                    u.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryUser {
    pub id: u64,
    pub username: String,
}
