//! Database access for vinfill-ai
//!
//! The shared `settings` table comes from `vinfill_common::db`; this module adds
//! the work item, transition audit and generation cache tables.

pub mod cache_entries;
pub mod settings;
pub mod work_items;

pub use cache_entries::{CacheStore, SqliteCacheStore};
pub use work_items::{ItemRepository, SqliteItemRepository, StatusUpdate};

use sqlx::SqlitePool;
use std::path::Path;
use vinfill_common::Result;

/// Open the database and make sure every vinfill-ai table exists
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = vinfill_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create vinfill-ai tables (idempotent)
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    vinfill_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            producer TEXT,
            region TEXT,
            country TEXT,
            grape TEXT,
            category TEXT NOT NULL,
            vintage INTEGER,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            last_error TEXT,
            enrichment TEXT,
            rating INTEGER,
            provenance TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status, created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_transitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL REFERENCES work_items(id),
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_item_transitions_item ON item_transitions(item_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generation_cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            stored_at INTEGER NOT NULL,
            ttl_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        init_tables(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
             AND name IN ('settings', 'work_items', 'item_transitions', 'generation_cache')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 4);
    }
}
