//! guildlink Types - Core types for guild identity linking
//!
//! guildlink keeps membership of a Discord guild in step with the EVE Online
//! character each member linked when joining. Discord issues the OAuth2
//! tokens and hosts the guild; an external validation server decides whether
//! a character is still entitled to access and which tickers it carries.
//!
//! ## Key Concepts
//!
//! - **LinkedIdentity**: One stored pairing of a character and a Discord account
//! - **ValidationVerdict**: The validation server's current view of a character
//! - **RefreshOutcome**: Result of exchanging a refresh token with Discord
//! - **PassReport**: Counters describing one reconciliation pass

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod identity;
pub mod ids;
pub mod oauth;
pub mod report;
pub mod verdict;

// Re-export main types
pub use identity::{nickname, LinkedIdentity, Tickers};
pub use ids::{CharacterId, DiscordUserId, IdError, IdentityId};
pub use oauth::{CharacterCookie, CookieError, DiscordUser, RefreshOutcome, TokenGrant};
pub use report::{PassKind, PassReport};
pub use verdict::ValidationVerdict;
