//! SQLite-backed preferences and token storage
//!
//! Values live in the `preferences` key/value table. Tokens are stored under
//! the `access_token`, `refresh_token` and `token_expires_at` keys and are
//! always written or cleared together in one transaction.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use daybook_core::ports::{keys, IPreferenceStore, ITokenStore, Tokens};

use crate::CacheError;

/// Preference store over the local database
#[derive(Clone)]
pub struct SqlitePreferenceStore {
    pool: SqlitePool,
}

impl SqlitePreferenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const UPSERT: &str = "INSERT INTO preferences (key, value, updated_at) VALUES (?, ?, ?) \
                      ON CONFLICT (key) DO UPDATE SET \
                        value = excluded.value, updated_at = excluded.updated_at";

#[async_trait::async_trait]
impl IPreferenceStore for SqlitePreferenceStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        tracing::trace!(key, "Stored preference");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ITokenStore for SqlitePreferenceStore {
    async fn load(&self) -> anyhow::Result<Option<Tokens>> {
        let Some(access_token) = self.get(keys::ACCESS_TOKEN).await? else {
            return Ok(None);
        };
        let refresh_token = self.get(keys::REFRESH_TOKEN).await?;
        // A missing expiry forces a refresh on first use
        let expires_at = match self.get(keys::TOKEN_EXPIRES_AT).await? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    CacheError::SerializationError(format!("Invalid token expiry '{raw}': {e}"))
                })?,
            None => Utc::now(),
        };

        Ok(Some(Tokens {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    async fn store(&self, tokens: &Tokens) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT)
            .bind(keys::ACCESS_TOKEN)
            .bind(&tokens.access_token)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        sqlx::query(UPSERT)
            .bind(keys::TOKEN_EXPIRES_AT)
            .bind(tokens.expires_at.to_rfc3339())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        match &tokens.refresh_token {
            Some(refresh) => {
                sqlx::query(UPSERT)
                    .bind(keys::REFRESH_TOKEN)
                    .bind(refresh)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM preferences WHERE key = ?")
                    .bind(keys::REFRESH_TOKEN)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        tracing::debug!("Stored tokens in database");
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM preferences WHERE key IN (?, ?, ?)")
            .bind(keys::ACCESS_TOKEN)
            .bind(keys::REFRESH_TOKEN)
            .bind(keys::TOKEN_EXPIRES_AT)
            .execute(&self.pool)
            .await?;
        tracing::debug!("Cleared tokens from database");
        Ok(())
    }
}
