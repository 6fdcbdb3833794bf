//! Discord OAuth2 and linking handshake payloads

use crate::{CharacterId, DiscordUserId, IdError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of exchanging a refresh token with Discord.
///
/// Hard failures are reported through the client's error type instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Discord issued a new access token
    Refreshed {
        access_token: String,
        scope: Option<String>,
    },

    /// Discord answered `invalid_grant`: the user revoked access
    Revoked,
}

/// Tokens granted by an authorization code exchange
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Subset of the Discord `/users/@me` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
}

impl DiscordUser {
    pub fn discord_id(&self) -> Result<DiscordUserId, IdError> {
        DiscordUserId::parse(&self.id)
    }
}

/// Errors decoding the character cookie
#[derive(Debug, Error)]
pub enum CookieError {
    #[error("character cookie is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("character cookie is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Character details handed over by the EVE SSO service in the `char` cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterCookie {
    #[serde(rename = "EveCharID")]
    pub character_id: CharacterId,
    #[serde(rename = "EveCorpID", default)]
    pub corporation_id: i64,
    #[serde(rename = "EveAlliID", default)]
    pub alliance_id: i64,
    #[serde(rename = "EveCharName", default)]
    pub character_name: String,
    #[serde(rename = "EveCorpName", default)]
    pub corporation_name: String,
    #[serde(rename = "EveAlliName", default)]
    pub alliance_name: String,
    #[serde(rename = "EveCorpTicker", default)]
    pub corporation_ticker: String,
    #[serde(rename = "EveAlliTicker", default)]
    pub alliance_ticker: String,
    #[serde(rename = "Valid", default)]
    pub valid: bool,
}

impl CharacterCookie {
    /// Decode a base64 (standard alphabet) JSON cookie value
    pub fn decode(value: &str) -> Result<Self, CookieError> {
        let json = STANDARD.decode(value.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn encode(&self) -> Result<String, CookieError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}
