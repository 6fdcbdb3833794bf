//! Application state for API handlers

use super::session::StateSigner;
use crate::scheduler::Scheduler;
use crate::storage::IdentityStorage;
use crate::upstream::{GuildMembership, TokenProvider};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Storage backend
    pub storage: Arc<dyn IdentityStorage>,

    /// Scheduler handle
    pub scheduler: Arc<Scheduler>,

    /// Discord OAuth2
    pub oauth: Arc<dyn TokenProvider>,

    /// Discord guild
    pub guild: Arc<dyn GuildMembership>,

    /// Roles granted to newly linked members
    pub guild_roles: Arc<[String]>,

    /// State cookie signer
    pub signer: StateSigner,

    /// Upper bound for a linking request
    pub request_timeout: Duration,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        storage: Arc<dyn IdentityStorage>,
        scheduler: Arc<Scheduler>,
        oauth: Arc<dyn TokenProvider>,
        guild: Arc<dyn GuildMembership>,
        guild_roles: Vec<String>,
        session_key: &str,
        request_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            scheduler,
            oauth,
            guild,
            guild_roles: guild_roles.into(),
            signer: StateSigner::new(session_key),
            request_timeout,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
