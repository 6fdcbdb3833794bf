//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use guildlink_types::{CharacterId, DiscordUserId, IdentityId, LinkedIdentity};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage for linked identities.
///
/// Every call is an independent transaction; callers hold no lock across
/// calls. Writes to the same row are serialized by the backend.
#[async_trait]
pub trait IdentityStorage: Send + Sync {
    /// Character ids of all active identities
    async fn active_character_ids(&self) -> StorageResult<Vec<CharacterId>>;

    /// All identities, active or not
    async fn list_identities(&self) -> StorageResult<Vec<LinkedIdentity>>;

    /// Identities whose Discord token is still believed valid
    async fn list_identities_with_valid_token(&self) -> StorageResult<Vec<LinkedIdentity>>;

    /// Overwrite a stored identity, matched by its id
    async fn update_identity(&self, identity: &LinkedIdentity) -> StorageResult<()>;

    /// Replace only the access token of one identity
    async fn update_access_token(&self, id: IdentityId, access_token: &str) -> StorageResult<()>;

    /// Flag the Discord token of one identity as no longer valid
    async fn invalidate_token(&self, id: IdentityId) -> StorageResult<()>;

    /// Replace only the ticker pair of one identity
    async fn update_tickers(
        &self,
        id: IdentityId,
        corporation_ticker: &str,
        alliance_ticker: &str,
    ) -> StorageResult<()>;

    /// Mark the identity linked to a Discord account as inactive
    async fn set_inactive(&self, discord_id: &DiscordUserId) -> StorageResult<()>;

    /// Whether a Discord account is already linked
    async fn discord_id_exists(&self, discord_id: &DiscordUserId) -> StorageResult<bool>;

    /// Store a new identity and return it with its assigned id
    async fn create_identity(&self, identity: LinkedIdentity) -> StorageResult<LinkedIdentity>;

    /// Get the identity linked to a Discord account
    async fn get_identity_by_discord_id(
        &self,
        discord_id: &DiscordUserId,
    ) -> StorageResult<Option<LinkedIdentity>>;

    /// Create or overwrite the identity keyed by its Discord account (re-link)
    async fn upsert_by_discord_id(
        &self,
        mut identity: LinkedIdentity,
    ) -> StorageResult<LinkedIdentity> {
        match self.get_identity_by_discord_id(&identity.discord_id).await? {
            Some(existing) => {
                identity.id = existing.id;
                self.update_identity(&identity).await?;
                Ok(identity)
            }
            None => self.create_identity(identity).await,
        }
    }
}
