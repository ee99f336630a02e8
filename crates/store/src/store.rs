//! Publishing configuration store over a `SqlitePool`.

use {
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::error::Result;

/// Per-guild channel bindings and two-tier source keys.
///
/// All operations are single statements: each completes or has no effect.
/// Upserts go through the per-tier uniqueness constraint, so two concurrent
/// writes for the same key tuple collapse into one row instead of
/// duplicating it.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store with its own connection pool and run migrations.
    ///
    /// For a pool shared with other subsystems, run [`crate::run_migrations`]
    /// yourself and use [`SqliteStore::with_pool`].
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Create a store from an existing pool (migrations must already be run).
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve the effective source key: the user override tier first, then
    /// the guild default. Without a guild there is no key.
    pub async fn source_key(
        &self,
        user_id: Option<u64>,
        guild_id: Option<u64>,
    ) -> Result<Option<String>> {
        let Some(guild_id) = guild_id else {
            return Ok(None);
        };

        if let Some(user_id) = user_id {
            let row = sqlx::query(
                "SELECT source_key FROM guild_user_source_key_override
                 WHERE guild_id = ? AND user_id = ?",
            )
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                return Ok(Some(row.get("source_key")));
            }
        }

        let row = sqlx::query("SELECT source_key FROM guild_source_key WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("source_key")))
    }

    /// Upsert a source key. A `user_id` selects the override tier, otherwise
    /// the guild default tier.
    pub async fn set_source_key(
        &self,
        guild_id: u64,
        source_key: &str,
        user_id: Option<u64>,
    ) -> Result<()> {
        match user_id {
            Some(user_id) => {
                sqlx::query(
                    "INSERT INTO guild_user_source_key_override (guild_id, user_id, source_key)
                     VALUES (?, ?, ?)
                     ON CONFLICT(guild_id, user_id) DO UPDATE SET source_key = excluded.source_key",
                )
                .bind(guild_id as i64)
                .bind(user_id as i64)
                .bind(source_key)
                .execute(&self.pool)
                .await?;
            },
            None => {
                sqlx::query(
                    "INSERT INTO guild_source_key (guild_id, source_key)
                     VALUES (?, ?)
                     ON CONFLICT(guild_id) DO UPDATE SET source_key = excluded.source_key",
                )
                .bind(guild_id as i64)
                .bind(source_key)
                .execute(&self.pool)
                .await?;
            },
        }
        Ok(())
    }

    /// Delete a source key row; deleting an absent row is a success.
    pub async fn clear_source_key(&self, guild_id: u64, user_id: Option<u64>) -> Result<()> {
        let result = match user_id {
            Some(user_id) => {
                sqlx::query(
                    "DELETE FROM guild_user_source_key_override
                     WHERE guild_id = ? AND user_id = ?",
                )
                .bind(guild_id as i64)
                .bind(user_id as i64)
                .execute(&self.pool)
                .await?
            },
            None => {
                sqlx::query("DELETE FROM guild_source_key WHERE guild_id = ?")
                    .bind(guild_id as i64)
                    .execute(&self.pool)
                    .await?
            },
        };
        debug!(guild_id, rows = result.rows_affected(), "cleared source key");
        Ok(())
    }

    /// All guild-default source keys, optionally filtered to one guild.
    /// User-override keys are never listed.
    pub async fn list_source_keys(&self, guild_id: Option<u64>) -> Result<Vec<String>> {
        let rows = match guild_id {
            Some(guild_id) => {
                sqlx::query("SELECT source_key FROM guild_source_key WHERE guild_id = ?")
                    .bind(guild_id as i64)
                    .fetch_all(&self.pool)
                    .await?
            },
            None => {
                sqlx::query("SELECT source_key FROM guild_source_key ORDER BY guild_id")
                    .fetch_all(&self.pool)
                    .await?
            },
        };
        Ok(rows.iter().map(|r| r.get("source_key")).collect())
    }

    /// The guild's configured auto-publishing channel, if any.
    pub async fn publishing_channel(&self, guild_id: u64) -> Result<Option<u64>> {
        let row = sqlx::query("SELECT channel_id FROM guild_publishing_channel WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("channel_id") as u64))
    }

    /// Bind a guild's auto-publishing channel; one binding per guild.
    pub async fn set_publishing_channel(&self, guild_id: u64, channel_id: u64) -> Result<()> {
        sqlx::query(
            "INSERT INTO guild_publishing_channel (guild_id, channel_id)
             VALUES (?, ?)
             ON CONFLICT(guild_id) DO UPDATE SET channel_id = excluded.channel_id",
        )
        .bind(guild_id as i64)
        .bind(channel_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a guild's auto-publishing binding; absent rows are a success.
    pub async fn delete_publishing_channel(&self, guild_id: u64) -> Result<()> {
        sqlx::query("DELETE FROM guild_publishing_channel WHERE guild_id = ?")
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn source_key_without_guild_is_none() {
        let store = make_store().await;
        assert_eq!(store.source_key(Some(5), None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_source_key_is_idempotent_per_tier() {
        let store = make_store().await;
        store.set_source_key(1, "k", None).await.unwrap();
        store.set_source_key(1, "k", None).await.unwrap();

        let keys = store.list_source_keys(Some(1)).await.unwrap();
        assert_eq!(keys, vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn upsert_overwrites_in_place() {
        let store = make_store().await;
        store.set_source_key(1, "old", None).await.unwrap();
        store.set_source_key(1, "new", None).await.unwrap();
        assert_eq!(
            store.source_key(None, Some(1)).await.unwrap(),
            Some("new".into())
        );

        store.set_source_key(1, "u-old", Some(9)).await.unwrap();
        store.set_source_key(1, "u-new", Some(9)).await.unwrap();
        assert_eq!(
            store.source_key(Some(9), Some(1)).await.unwrap(),
            Some("u-new".into())
        );
    }

    #[tokio::test]
    async fn user_override_takes_precedence_over_guild_default() {
        let store = make_store().await;
        store.set_source_key(1, "A", None).await.unwrap();
        store.set_source_key(1, "B", Some(7)).await.unwrap();

        assert_eq!(
            store.source_key(Some(7), Some(1)).await.unwrap(),
            Some("B".into())
        );
        assert_eq!(
            store.source_key(None, Some(1)).await.unwrap(),
            Some("A".into())
        );
        // A user without an override falls back to the guild default.
        assert_eq!(
            store.source_key(Some(8), Some(1)).await.unwrap(),
            Some("A".into())
        );
    }

    #[tokio::test]
    async fn absent_both_tiers_resolves_to_none() {
        let store = make_store().await;
        assert_eq!(store.source_key(Some(7), Some(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_on_absent_rows_is_a_no_op() {
        let store = make_store().await;
        store.clear_source_key(1, None).await.unwrap();
        store.clear_source_key(1, Some(7)).await.unwrap();
        assert!(store.list_source_keys(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_removes_only_the_addressed_tier() {
        let store = make_store().await;
        store.set_source_key(1, "A", None).await.unwrap();
        store.set_source_key(1, "B", Some(7)).await.unwrap();

        store.clear_source_key(1, Some(7)).await.unwrap();
        assert_eq!(
            store.source_key(Some(7), Some(1)).await.unwrap(),
            Some("A".into())
        );

        store.clear_source_key(1, None).await.unwrap();
        assert_eq!(store.source_key(Some(7), Some(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_excludes_user_overrides_and_filters_by_guild() {
        let store = make_store().await;
        store.set_source_key(1, "g1", None).await.unwrap();
        store.set_source_key(2, "g2", None).await.unwrap();
        store.set_source_key(1, "override", Some(7)).await.unwrap();

        let all = store.list_source_keys(None).await.unwrap();
        assert_eq!(all, vec!["g1".to_string(), "g2".to_string()]);

        let one = store.list_source_keys(Some(2)).await.unwrap();
        assert_eq!(one, vec!["g2".to_string()]);
    }

    #[tokio::test]
    async fn publishing_channel_upsert_and_delete() {
        let store = make_store().await;
        assert_eq!(store.publishing_channel(1).await.unwrap(), None);

        store.set_publishing_channel(1, 100).await.unwrap();
        store.set_publishing_channel(1, 200).await.unwrap();
        assert_eq!(store.publishing_channel(1).await.unwrap(), Some(200));

        store.delete_publishing_channel(1).await.unwrap();
        assert_eq!(store.publishing_channel(1).await.unwrap(), None);
        // Deleting again stays a success.
        store.delete_publishing_channel(1).await.unwrap();
    }
}
