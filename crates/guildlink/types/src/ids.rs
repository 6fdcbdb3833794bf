//! Strongly-typed identifiers for linked identities
//!
//! Character ids come from EVE, Discord ids are snowflakes kept as strings,
//! identity ids are assigned by the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("Discord id must not be empty")]
    EmptyDiscordId,

    #[error("Discord id must be numeric, got {0:?}")]
    NonNumericDiscordId(String),

    #[error("invalid character id {0:?}")]
    InvalidCharacterId(String),
}

/// Store-assigned identifier of a linked identity row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(i64);

impl IdentityId {
    /// Placeholder for rows that have not been stored yet
    pub const UNASSIGNED: IdentityId = IdentityId(0);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_assigned(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identity:{}", self.0)
    }
}

/// EVE character id, the validation server's business key.
///
/// Not unique across linked identities: one character may be linked to
/// several Discord accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(i64);

impl CharacterId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CharacterId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| IdError::InvalidCharacterId(s.to_string()))
    }
}

/// Discord user snowflake, unique per linked identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscordUserId(String);

impl DiscordUserId {
    /// Wrap an id without validation (ids read back from storage)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an id received from outside, requiring a numeric snowflake
    pub fn parse(id: &str) -> Result<Self, IdError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(IdError::EmptyDiscordId);
        }
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdError::NonNumericDiscordId(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiscordUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discord_id_parse() {
        assert_eq!(
            DiscordUserId::parse(" 80351110224678912 ").unwrap().as_str(),
            "80351110224678912"
        );
        assert_eq!(DiscordUserId::parse(""), Err(IdError::EmptyDiscordId));
        assert!(matches!(
            DiscordUserId::parse("abc"),
            Err(IdError::NonNumericDiscordId(_))
        ));
    }

    #[test]
    fn test_character_id_serializes_as_integer() {
        let json = serde_json::to_string(&vec![CharacterId::new(7), CharacterId::new(90000001)])
            .unwrap();
        assert_eq!(json, "[7,90000001]");
        assert_eq!("42".parse::<CharacterId>().unwrap(), CharacterId::new(42));
    }

    #[test]
    fn test_identity_id_assignment() {
        assert!(!IdentityId::UNASSIGNED.is_assigned());
        assert!(IdentityId::new(3).is_assigned());
        assert_eq!(IdentityId::new(3).to_string(), "identity:3");
    }
}
