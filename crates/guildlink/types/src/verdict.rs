//! Verdicts returned by the validation server

use crate::{CharacterId, Tickers};
use serde::{Deserialize, Serialize};

/// The validation server's current view of one character.
///
/// Field names follow the validation server's wire format; snake_case
/// aliases are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    #[serde(rename = "EveCharID", alias = "eve_char_id")]
    pub character_id: CharacterId,

    #[serde(rename = "EveCharName", alias = "eve_char_name", default)]
    pub character_name: String,

    #[serde(rename = "EveCorpTicker", alias = "eve_corp_ticker", default)]
    pub corporation_ticker: String,

    #[serde(rename = "EveAlliTicker", alias = "eve_alli_ticker", default)]
    pub alliance_ticker: String,

    #[serde(rename = "Valid", alias = "valid")]
    pub valid: bool,
}

impl ValidationVerdict {
    pub fn valid(
        character_id: CharacterId,
        character_name: impl Into<String>,
        corporation_ticker: impl Into<String>,
        alliance_ticker: impl Into<String>,
    ) -> Self {
        Self {
            character_id,
            character_name: character_name.into(),
            corporation_ticker: corporation_ticker.into(),
            alliance_ticker: alliance_ticker.into(),
            valid: true,
        }
    }

    pub fn invalid(character_id: CharacterId) -> Self {
        Self {
            character_id,
            character_name: String::new(),
            corporation_ticker: String::new(),
            alliance_ticker: String::new(),
            valid: false,
        }
    }

    pub fn tickers(&self) -> Tickers<'_> {
        Tickers {
            corporation: &self.corporation_ticker,
            alliance: &self.alliance_ticker,
        }
    }

    /// Guild nickname this verdict asks for
    pub fn nickname(&self) -> String {
        crate::nickname(
            &self.character_name,
            &self.corporation_ticker,
            &self.alliance_ticker,
        )
    }
}
