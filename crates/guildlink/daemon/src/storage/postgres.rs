//! PostgreSQL storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use guildlink_types::{CharacterId, DiscordUserId, IdentityId, LinkedIdentity};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use std::time::Duration;

const SELECT_IDENTITY: &str = r#"
    SELECT id, eve_char_id, eve_char_name, eve_corp_ticker, eve_alli_ticker,
           discord_id, discord_access_token, discord_refresh_token,
           discord_token_scope, discord_token_is_valid, active
    FROM discord_user"#;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS discord_user (
                id                     BIGSERIAL PRIMARY KEY,
                eve_char_id            BIGINT NOT NULL,
                eve_char_name          VARCHAR(50) NOT NULL,
                eve_corp_ticker        VARCHAR(50) NOT NULL,
                eve_alli_ticker        VARCHAR(50) NOT NULL,
                discord_id             VARCHAR(50) NOT NULL UNIQUE,
                discord_access_token   TEXT NOT NULL,
                discord_refresh_token  TEXT NOT NULL,
                discord_token_scope    TEXT NOT NULL,
                discord_token_is_valid BOOLEAN NOT NULL DEFAULT TRUE,
                active                 BOOLEAN NOT NULL DEFAULT TRUE
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS discord_user_eve_char_id ON discord_user(eve_char_id);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn from_row(row: &PgRow) -> Result<LinkedIdentity, StorageError> {
        let get_err = |e: sqlx::Error| StorageError::InvalidData(e.to_string());

        Ok(LinkedIdentity {
            id: IdentityId::new(row.try_get("id").map_err(get_err)?),
            character_id: CharacterId::new(row.try_get("eve_char_id").map_err(get_err)?),
            character_name: row.try_get("eve_char_name").map_err(get_err)?,
            corporation_ticker: row.try_get("eve_corp_ticker").map_err(get_err)?,
            alliance_ticker: row.try_get("eve_alli_ticker").map_err(get_err)?,
            discord_id: DiscordUserId::new(row.try_get::<String, _>("discord_id").map_err(get_err)?),
            access_token: row.try_get("discord_access_token").map_err(get_err)?,
            refresh_token: row.try_get("discord_refresh_token").map_err(get_err)?,
            token_scope: row.try_get("discord_token_scope").map_err(get_err)?,
            token_valid: row.try_get("discord_token_is_valid").map_err(get_err)?,
            active: row.try_get("active").map_err(get_err)?,
        })
    }

    async fn fetch_identities(&self, filter: &str) -> StorageResult<Vec<LinkedIdentity>> {
        let query = format!("{} {} ORDER BY id", SELECT_IDENTITY, filter);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.iter().map(Self::from_row).collect()
    }
}

fn expect_row(rows_affected: u64, id: IdentityId) -> StorageResult<()> {
    if rows_affected == 0 {
        return Err(StorageError::NotFound(format!("{} not found", id)));
    }
    Ok(())
}

fn map_write_error(e: sqlx::Error, discord_id: &DiscordUserId) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Conflict(format!("Discord id {} is already linked", discord_id))
        }
        _ => StorageError::Query(e.to_string()),
    }
}

#[async_trait]
impl IdentityStorage for PostgresStorage {
    async fn active_character_ids(&self) -> StorageResult<Vec<CharacterId>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT eve_char_id FROM discord_user WHERE active")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(ids.into_iter().map(CharacterId::new).collect())
    }

    async fn list_identities(&self) -> StorageResult<Vec<LinkedIdentity>> {
        self.fetch_identities("").await
    }

    async fn list_identities_with_valid_token(&self) -> StorageResult<Vec<LinkedIdentity>> {
        self.fetch_identities("WHERE discord_token_is_valid").await
    }

    async fn update_identity(&self, identity: &LinkedIdentity) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE discord_user
            SET eve_char_id = $1,
                eve_char_name = $2,
                eve_corp_ticker = $3,
                eve_alli_ticker = $4,
                discord_id = $5,
                discord_access_token = $6,
                discord_refresh_token = $7,
                discord_token_scope = $8,
                discord_token_is_valid = $9,
                active = $10
            WHERE id = $11
            "#,
        )
        .bind(identity.character_id.get())
        .bind(&identity.character_name)
        .bind(&identity.corporation_ticker)
        .bind(&identity.alliance_ticker)
        .bind(identity.discord_id.as_str())
        .bind(&identity.access_token)
        .bind(&identity.refresh_token)
        .bind(&identity.token_scope)
        .bind(identity.token_valid)
        .bind(identity.active)
        .bind(identity.id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &identity.discord_id))?;

        expect_row(result.rows_affected(), identity.id)
    }

    async fn update_access_token(&self, id: IdentityId, access_token: &str) -> StorageResult<()> {
        let result = sqlx::query("UPDATE discord_user SET discord_access_token = $1 WHERE id = $2")
            .bind(access_token)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        expect_row(result.rows_affected(), id)
    }

    async fn invalidate_token(&self, id: IdentityId) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE discord_user SET discord_token_is_valid = FALSE WHERE id = $1")
                .bind(id.get())
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        expect_row(result.rows_affected(), id)
    }

    async fn update_tickers(
        &self,
        id: IdentityId,
        corporation_ticker: &str,
        alliance_ticker: &str,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE discord_user SET eve_corp_ticker = $1, eve_alli_ticker = $2 WHERE id = $3",
        )
        .bind(corporation_ticker)
        .bind(alliance_ticker)
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        expect_row(result.rows_affected(), id)
    }

    async fn set_inactive(&self, discord_id: &DiscordUserId) -> StorageResult<()> {
        sqlx::query("UPDATE discord_user SET active = FALSE WHERE discord_id = $1")
            .bind(discord_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn discord_id_exists(&self, discord_id: &DiscordUserId) -> StorageResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM discord_user WHERE discord_id = $1)")
            .bind(discord_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))
    }

    async fn create_identity(&self, mut identity: LinkedIdentity) -> StorageResult<LinkedIdentity> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO discord_user
                (eve_char_id, eve_char_name, eve_corp_ticker, eve_alli_ticker,
                 discord_id, discord_access_token, discord_refresh_token,
                 discord_token_scope, discord_token_is_valid, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(identity.character_id.get())
        .bind(&identity.character_name)
        .bind(&identity.corporation_ticker)
        .bind(&identity.alliance_ticker)
        .bind(identity.discord_id.as_str())
        .bind(&identity.access_token)
        .bind(&identity.refresh_token)
        .bind(&identity.token_scope)
        .bind(identity.token_valid)
        .bind(identity.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &identity.discord_id))?;

        identity.id = IdentityId::new(id);
        Ok(identity)
    }

    async fn get_identity_by_discord_id(
        &self,
        discord_id: &DiscordUserId,
    ) -> StorageResult<Option<LinkedIdentity>> {
        let query = format!("{} WHERE discord_id = $1", SELECT_IDENTITY);
        let row = sqlx::query(&query)
            .bind(discord_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn upsert_by_discord_id(
        &self,
        mut identity: LinkedIdentity,
    ) -> StorageResult<LinkedIdentity> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO discord_user
                (eve_char_id, eve_char_name, eve_corp_ticker, eve_alli_ticker,
                 discord_id, discord_access_token, discord_refresh_token,
                 discord_token_scope, discord_token_is_valid, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (discord_id)
            DO UPDATE SET
                eve_char_id = EXCLUDED.eve_char_id,
                eve_char_name = EXCLUDED.eve_char_name,
                eve_corp_ticker = EXCLUDED.eve_corp_ticker,
                eve_alli_ticker = EXCLUDED.eve_alli_ticker,
                discord_access_token = EXCLUDED.discord_access_token,
                discord_refresh_token = EXCLUDED.discord_refresh_token,
                discord_token_scope = EXCLUDED.discord_token_scope,
                discord_token_is_valid = EXCLUDED.discord_token_is_valid,
                active = EXCLUDED.active
            RETURNING id
            "#,
        )
        .bind(identity.character_id.get())
        .bind(&identity.character_name)
        .bind(&identity.corporation_ticker)
        .bind(&identity.alliance_ticker)
        .bind(identity.discord_id.as_str())
        .bind(&identity.access_token)
        .bind(&identity.refresh_token)
        .bind(&identity.token_scope)
        .bind(identity.token_valid)
        .bind(identity.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        identity.id = IdentityId::new(id);
        Ok(identity)
    }
}
