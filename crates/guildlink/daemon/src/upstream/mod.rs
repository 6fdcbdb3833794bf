//! Outbound clients
//!
//! Three external systems fail independently of each other:
//! - the validation server, asked for verdicts on active characters
//! - Discord OAuth2, which refreshes and grants tokens
//! - the Discord REST API, which owns guild membership
//!
//! Each is reached through a trait so the scheduler can be driven by fakes.

mod discord;
mod oauth;
mod validation;

pub use discord::DiscordGuildClient;
pub use oauth::{DiscordOAuthClient, REVOKED_GRANT_ERROR};
pub use validation::HttpValidationClient;

use crate::error::{UpstreamError, UpstreamResult};
use async_trait::async_trait;
use guildlink_types::{
    CharacterId, DiscordUser, DiscordUserId, RefreshOutcome, TokenGrant, ValidationVerdict,
};
use reqwest::Client;
use std::time::Duration;

/// The validation server
#[async_trait]
pub trait ValidationAuthority: Send + Sync {
    /// Ask for verdicts on a batch of characters
    async fn validate(&self, ids: &[CharacterId]) -> UpstreamResult<Vec<ValidationVerdict>>;
}

/// Discord OAuth2 token endpoint
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str, scope: &str) -> UpstreamResult<RefreshOutcome>;

    /// Exchange an authorization code (linking handshake)
    async fn exchange_code(&self, code: &str) -> UpstreamResult<TokenGrant>;

    /// Look up the user an access token belongs to
    async fn fetch_user(&self, access_token: &str) -> UpstreamResult<DiscordUser>;

    /// URL the user is sent to to authorize the application
    fn authorize_url(&self, state: &str) -> UpstreamResult<String>;
}

/// Guild membership on Discord
#[async_trait]
pub trait GuildMembership: Send + Sync {
    /// Add a user to the guild using their OAuth2 access token
    async fn add_member(
        &self,
        discord_id: &DiscordUserId,
        access_token: &str,
        nickname: &str,
        roles: &[String],
    ) -> UpstreamResult<()>;

    /// Remove a user from the guild
    async fn remove_member(&self, discord_id: &DiscordUserId) -> UpstreamResult<()>;

    /// Change a member's guild nickname
    async fn rename_member(&self, discord_id: &DiscordUserId, nickname: &str)
        -> UpstreamResult<()>;
}

fn build_http_client(timeout_secs: u64) -> UpstreamResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("guildlink/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UpstreamError::InvalidConfig(e.to_string()))
}

/// Turn a non-success response into `UpstreamError::Status`
async fn ensure_success(response: reqwest::Response) -> UpstreamResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}
