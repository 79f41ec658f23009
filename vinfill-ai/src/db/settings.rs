//! Settings database operations
//!
//! Key-value accessors over the shared `settings` table.

use sqlx::{Pool, Sqlite};
use vinfill_common::{Error, Result};

#[cfg(test)]
use sqlx::SqlitePool;

/// Settings key holding the generation service API key
pub const GENERATION_API_KEY: &str = "generation_api_key";

/// Get the generation API key from the database
///
/// **Returns:** Some(key) if set and non-empty, None otherwise
pub async fn get_generation_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    let key = get_setting::<String>(db, GENERATION_API_KEY).await?;
    Ok(key.filter(|k| !k.trim().is_empty()))
}

/// Store the generation API key in the database
pub async fn set_generation_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, GENERATION_API_KEY, key).await
}

/// Generic setting getter
///
/// NULL values read as unset. Values that fail to parse are a configuration
/// error rather than a silent default.
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row.and_then(|(value,)| value) {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        vinfill_common::db::create_settings_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_api_key_not_set() {
        let pool = setup_test_db().await;
        assert_eq!(get_generation_api_key(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_api_key_upsert() {
        let pool = setup_test_db().await;

        set_generation_api_key(&pool, "old_key".to_string()).await.unwrap();
        set_generation_api_key(&pool, "new_key".to_string()).await.unwrap();

        assert_eq!(
            get_generation_api_key(&pool).await.unwrap(),
            Some("new_key".to_string())
        );

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = ?")
            .bind(GENERATION_API_KEY)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1, "Should have exactly one entry after update");
    }

    #[tokio::test]
    async fn test_blank_api_key_reads_as_unset() {
        let pool = setup_test_db().await;
        set_generation_api_key(&pool, "   ".to_string()).await.unwrap();
        assert_eq!(get_generation_api_key(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_typed_setting_parse_error() {
        let pool = setup_test_db().await;
        set_setting(&pool, "max_concurrent", "three").await.unwrap();

        let result = get_setting::<usize>(&pool, "max_concurrent").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_null_value_reads_as_unset() {
        let pool = setup_test_db().await;
        sqlx::query("INSERT INTO settings (key, value) VALUES ('poll_interval_ms', NULL)")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(get_setting::<u64>(&pool, "poll_interval_ms").await.unwrap(), None);
    }
}
