//! Persistent half of the generation cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use vinfill_common::time::{from_epoch_millis, to_epoch_millis};
use vinfill_common::Result;

use crate::cache::CacheEntry;

/// Durable key-value store behind the in-memory LRU
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stored entry for `key`, expired or not
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace
    async fn store(&self, entry: &CacheEntry) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Delete entries stored before `cutoff`; returns the number removed
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// `generation_cache` table
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(String, i64, i64)> =
            sqlx::query_as("SELECT value, stored_at, ttl_ms FROM generation_cache WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value, stored_at, ttl_ms)| CacheEntry {
            key: key.to_string(),
            value,
            stored_at: from_epoch_millis(stored_at),
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        }))
    }

    async fn store(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_cache (key, value, stored_at, ttl_ms) VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                stored_at = excluded.stored_at,
                ttl_ms = excluded.ttl_ms
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(to_epoch_millis(entry.stored_at))
        .bind(i64::try_from(entry.ttl.as_millis()).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM generation_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM generation_cache WHERE stored_at < ?")
            .bind(to_epoch_millis(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteCacheStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        SqliteCacheStore::new(pool)
    }

    fn entry(key: &str, value: &str, stored_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: value.to_string(),
            stored_at,
            ttl: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn test_store_load_replace() {
        let store = setup_store().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        store.store(&entry("k", "first", at)).await.unwrap();
        store.store(&entry("k", "second", at)).await.unwrap();

        let loaded = store.load("k").await.unwrap().unwrap();
        assert_eq!(loaded.value, "second");
        assert_eq!(loaded.stored_at, at);
        assert_eq!(loaded.ttl, Duration::from_secs(3600));

        store.remove("k").await.unwrap();
        assert!(store.load("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prune_only_removes_older_entries() {
        let store = setup_store().await;
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        store.store(&entry("old", "a", old)).await.unwrap();
        store.store(&entry("recent", "b", recent)).await.unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(store.prune(cutoff).await.unwrap(), 1);
        assert!(store.load("old").await.unwrap().is_none());
        assert!(store.load("recent").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sub_second_ttl_survives_reload() {
        let store = setup_store().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut short = entry("short", "v", at);
        short.ttl = Duration::from_millis(1500);

        store.store(&short).await.unwrap();

        let loaded = store.load("short").await.unwrap().unwrap();
        assert_eq!(loaded.ttl, Duration::from_millis(1500));
    }
}
