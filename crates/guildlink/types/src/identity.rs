//! Linked identity records
//!
//! A LinkedIdentity pairs an EVE character with the Discord account that
//! linked it, together with the Discord OAuth2 tokens issued during linking.

use crate::{CharacterId, DiscordUserId, IdentityId, ValidationVerdict};
use serde::{Deserialize, Serialize};

/// One linked (character, Discord account) pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    /// Store-assigned identifier
    pub id: IdentityId,

    /// Linked character, not unique across rows
    pub character_id: CharacterId,

    /// Character name shown in the guild nickname
    pub character_name: String,

    /// Corporation ticker
    pub corporation_ticker: String,

    /// Alliance ticker, empty when the corporation has no alliance
    pub alliance_ticker: String,

    /// Linked Discord account, unique across rows
    pub discord_id: DiscordUserId,

    /// Discord OAuth2 access token
    #[serde(skip_serializing, default)]
    pub access_token: String,

    /// Discord OAuth2 refresh token
    #[serde(skip_serializing, default)]
    pub refresh_token: String,

    /// Space separated scopes the tokens were granted for
    pub token_scope: String,

    /// False once Discord revoked the tokens
    pub token_valid: bool,

    /// False once the identity has been evicted from the guild
    pub active: bool,
}

impl LinkedIdentity {
    /// Build a freshly linked identity that has not been stored yet
    #[allow(clippy::too_many_arguments)]
    pub fn new_link(
        character_id: CharacterId,
        character_name: impl Into<String>,
        corporation_ticker: impl Into<String>,
        alliance_ticker: impl Into<String>,
        discord_id: DiscordUserId,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_scope: impl Into<String>,
    ) -> Self {
        Self {
            id: IdentityId::UNASSIGNED,
            character_id,
            character_name: character_name.into(),
            corporation_ticker: corporation_ticker.into(),
            alliance_ticker: alliance_ticker.into(),
            discord_id,
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_scope: token_scope.into(),
            token_valid: true,
            active: true,
        }
    }

    /// Stored ticker pair
    pub fn tickers(&self) -> Tickers<'_> {
        Tickers {
            corporation: &self.corporation_ticker,
            alliance: &self.alliance_ticker,
        }
    }

    /// Guild nickname for the stored attributes
    pub fn nickname(&self) -> String {
        nickname(
            &self.character_name,
            &self.corporation_ticker,
            &self.alliance_ticker,
        )
    }

    /// Whether the verdict carries tickers different from the stored ones.
    ///
    /// Only the tickers are compared; a renamed character alone does not
    /// count as a change.
    pub fn tickers_differ(&self, verdict: &ValidationVerdict) -> bool {
        self.tickers() != verdict.tickers()
    }
}

/// Borrowed corporation/alliance ticker pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tickers<'a> {
    pub corporation: &'a str,
    pub alliance: &'a str,
}

/// Format a guild nickname as `[ALLI CORP] Name`.
///
/// The tag pair is trimmed, so an empty alliance yields `[CORP] Name`.
pub fn nickname(name: &str, corporation_ticker: &str, alliance_ticker: &str) -> String {
    let tag = format!("{} {}", alliance_ticker, corporation_ticker);
    format!("[{}] {}", tag.trim(), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> LinkedIdentity {
        LinkedIdentity::new_link(
            CharacterId::new(7),
            "Pilot",
            "XYZ",
            "",
            DiscordUserId::new("1001"),
            "access",
            "refresh",
            "identify guilds.join",
        )
    }

    #[test]
    fn test_nickname_without_alliance() {
        assert_eq!(nickname("Pilot", "ABC", ""), "[ABC] Pilot");
    }

    #[test]
    fn test_nickname_with_alliance() {
        assert_eq!(nickname("Pilot", "ABC", "ALLI"), "[ALLI ABC] Pilot");
    }

    #[test]
    fn test_new_link_defaults() {
        let identity = identity();
        assert!(identity.active);
        assert!(identity.token_valid);
        assert!(!identity.id.is_assigned());
        assert_eq!(identity.nickname(), "[XYZ] Pilot");
    }

    #[test]
    fn test_tickers_differ_ignores_name() {
        let identity = identity();
        let mut verdict = ValidationVerdict::valid(CharacterId::new(7), "Renamed", "XYZ", "");
        assert!(!identity.tickers_differ(&verdict));

        verdict.alliance_ticker = "ALLI".to_string();
        assert!(identity.tickers_differ(&verdict));
    }

    #[test]
    fn test_tokens_not_serialized() {
        let json = serde_json::to_value(identity()).unwrap();
        assert!(json.get("access_token").is_none());
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["discord_id"], "1001");
    }
}
