//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use guildlink_types::{CharacterId, DiscordUserId, IdentityId, LinkedIdentity};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// In-memory storage for development and testing
#[derive(Debug)]
pub struct InMemoryStorage {
    identities: RwLock<BTreeMap<IdentityId, LinkedIdentity>>,
    sequence: AtomicI64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(BTreeMap::new()),
            sequence: AtomicI64::new(0),
        }
    }

    /// Get an identity by id
    pub async fn get_identity(&self, id: IdentityId) -> Option<LinkedIdentity> {
        self.identities.read().await.get(&id).cloned()
    }

    async fn modify(
        &self,
        id: IdentityId,
        change: impl FnOnce(&mut LinkedIdentity),
    ) -> StorageResult<()> {
        let mut identities = self.identities.write().await;
        let identity = identities
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("{} not found", id)))?;
        change(identity);
        Ok(())
    }
}

#[async_trait]
impl IdentityStorage for InMemoryStorage {
    async fn active_character_ids(&self) -> StorageResult<Vec<CharacterId>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .filter(|i| i.active)
            .map(|i| i.character_id)
            .collect())
    }

    async fn list_identities(&self) -> StorageResult<Vec<LinkedIdentity>> {
        let identities = self.identities.read().await;
        Ok(identities.values().cloned().collect())
    }

    async fn list_identities_with_valid_token(&self) -> StorageResult<Vec<LinkedIdentity>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .filter(|i| i.token_valid)
            .cloned()
            .collect())
    }

    async fn update_identity(&self, identity: &LinkedIdentity) -> StorageResult<()> {
        let mut identities = self.identities.write().await;

        if identities
            .values()
            .any(|i| i.discord_id == identity.discord_id && i.id != identity.id)
        {
            return Err(StorageError::Conflict(format!(
                "Discord id {} is linked to another identity",
                identity.discord_id
            )));
        }

        let stored = identities
            .get_mut(&identity.id)
            .ok_or_else(|| StorageError::NotFound(format!("{} not found", identity.id)))?;
        *stored = identity.clone();
        Ok(())
    }

    async fn update_access_token(&self, id: IdentityId, access_token: &str) -> StorageResult<()> {
        self.modify(id, |identity| identity.access_token = access_token.to_string())
            .await
    }

    async fn invalidate_token(&self, id: IdentityId) -> StorageResult<()> {
        self.modify(id, |identity| identity.token_valid = false).await
    }

    async fn update_tickers(
        &self,
        id: IdentityId,
        corporation_ticker: &str,
        alliance_ticker: &str,
    ) -> StorageResult<()> {
        self.modify(id, |identity| {
            identity.corporation_ticker = corporation_ticker.to_string();
            identity.alliance_ticker = alliance_ticker.to_string();
        })
        .await
    }

    async fn set_inactive(&self, discord_id: &DiscordUserId) -> StorageResult<()> {
        let mut identities = self.identities.write().await;
        if let Some(identity) = identities.values_mut().find(|i| &i.discord_id == discord_id) {
            identity.active = false;
        }
        Ok(())
    }

    async fn discord_id_exists(&self, discord_id: &DiscordUserId) -> StorageResult<bool> {
        let identities = self.identities.read().await;
        Ok(identities.values().any(|i| &i.discord_id == discord_id))
    }

    async fn create_identity(&self, mut identity: LinkedIdentity) -> StorageResult<LinkedIdentity> {
        let mut identities = self.identities.write().await;

        if identities
            .values()
            .any(|i| i.discord_id == identity.discord_id)
        {
            return Err(StorageError::Conflict(format!(
                "Discord id {} is already linked",
                identity.discord_id
            )));
        }

        let id = IdentityId::new(self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        identity.id = id;
        identities.insert(id, identity.clone());
        Ok(identity)
    }

    async fn get_identity_by_discord_id(
        &self,
        discord_id: &DiscordUserId,
    ) -> StorageResult<Option<LinkedIdentity>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .find(|i| &i.discord_id == discord_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_identity(character: i64, discord: &str) -> LinkedIdentity {
        LinkedIdentity::new_link(
            CharacterId::new(character),
            "Pilot",
            "ABC",
            "",
            DiscordUserId::new(discord),
            "access",
            "refresh",
            "identify guilds.join",
        )
    }

    #[tokio::test]
    async fn test_identity_crud() {
        let storage = InMemoryStorage::new();

        // Create
        let created = storage
            .create_identity(create_test_identity(7, "1001"))
            .await
            .unwrap();
        assert!(created.id.is_assigned());

        // Read
        assert!(storage
            .discord_id_exists(&DiscordUserId::new("1001"))
            .await
            .unwrap());
        assert!(!storage
            .discord_id_exists(&DiscordUserId::new("2002"))
            .await
            .unwrap());

        // Update
        let mut updated = created.clone();
        updated.corporation_ticker = "XYZ".to_string();
        storage.update_identity(&updated).await.unwrap();
        let stored = storage.get_identity(created.id).await.unwrap();
        assert_eq!(stored.corporation_ticker, "XYZ");
    }

    #[tokio::test]
    async fn test_discord_id_is_unique() {
        let storage = InMemoryStorage::new();
        storage
            .create_identity(create_test_identity(7, "1001"))
            .await
            .unwrap();

        let result = storage.create_identity(create_test_identity(8, "1001")).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // Same character on another account is allowed
        storage
            .create_identity(create_test_identity(7, "2002"))
            .await
            .unwrap();
        assert_eq!(storage.list_identities().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_active_and_valid_token_filters() {
        let storage = InMemoryStorage::new();
        storage
            .create_identity(create_test_identity(7, "1001"))
            .await
            .unwrap();
        let mut revoked = storage
            .create_identity(create_test_identity(8, "2002"))
            .await
            .unwrap();
        revoked.token_valid = false;
        storage.update_identity(&revoked).await.unwrap();

        storage
            .set_inactive(&DiscordUserId::new("1001"))
            .await
            .unwrap();

        assert_eq!(
            storage.active_character_ids().await.unwrap(),
            vec![CharacterId::new(8)]
        );
        let valid = storage.list_identities_with_valid_token().await.unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].discord_id, DiscordUserId::new("1001"));
    }

    #[tokio::test]
    async fn test_column_updates_touch_one_field() {
        let storage = InMemoryStorage::new();
        let created = storage
            .create_identity(create_test_identity(7, "1001"))
            .await
            .unwrap();

        storage
            .update_access_token(created.id, "fresh")
            .await
            .unwrap();
        storage
            .update_tickers(created.id, "NEW", "ALLI")
            .await
            .unwrap();
        storage.invalidate_token(created.id).await.unwrap();

        let stored = storage.get_identity(created.id).await.unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.refresh_token, "refresh");
        assert_eq!(stored.corporation_ticker, "NEW");
        assert_eq!(stored.alliance_ticker, "ALLI");
        assert!(!stored.token_valid);
        assert!(stored.active);

        let missing = storage.invalidate_token(IdentityId::new(99)).await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_missing_identity() {
        let storage = InMemoryStorage::new();
        let mut identity = create_test_identity(7, "1001");
        identity.id = IdentityId::new(42);
        let result = storage.update_identity(&identity).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_by_discord_id_keeps_id() {
        let storage = InMemoryStorage::new();
        let mut first = storage
            .upsert_by_discord_id(create_test_identity(7, "1001"))
            .await
            .unwrap();
        first.active = false;
        storage.update_identity(&first).await.unwrap();

        // Re-link the same Discord account to another character
        let relinked = storage
            .upsert_by_discord_id(create_test_identity(9, "1001"))
            .await
            .unwrap();
        assert_eq!(relinked.id, first.id);

        let stored = storage.get_identity(first.id).await.unwrap();
        assert_eq!(stored.character_id, CharacterId::new(9));
        assert!(stored.active);
        assert_eq!(storage.list_identities().await.unwrap().len(), 1);
    }
}
