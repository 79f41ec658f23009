//! Work item persistence
//!
//! Every status change is a conditional UPDATE guarded by the expected current
//! status, written in the same transaction as its `item_transitions` audit row.
//! A claim is the `pending → processing` write; `rows_affected == 1` means the
//! caller owns the item.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use uuid::Uuid;
use vinfill_common::{Error, Result};

use crate::models::{
    EnrichedRecord, ItemDescriptor, ItemStatus, StateTransition, WineCategory, WorkItem,
};
use crate::utils::{retry_on_lock, Clock};

/// Default total retry budget for lock contention
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const SELECT_ITEM: &str = r#"
    SELECT id, name, producer, region, country, grape, category, vintage,
           status, attempts, started_at, completed_at, last_error, enrichment
    FROM work_items
"#;

/// Optional column values written alongside a status change
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn completed_at(at: DateTime<Utc>) -> Self {
        Self {
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Storage boundary for work items
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Oldest pending items first, at most `limit`
    async fn get_pending(&self, limit: usize) -> Result<Vec<WorkItem>>;

    /// Atomic `pending → processing`; true when this caller won the claim
    async fn claim(&self, id: Uuid) -> Result<bool>;

    /// Move an item along a legal non-completing edge
    async fn update_status(&self, id: Uuid, status: ItemStatus, update: StatusUpdate) -> Result<()>;

    /// Write the final record and completed status in one transaction
    async fn commit_result(&self, id: Uuid, record: &EnrichedRecord, status: ItemStatus) -> Result<()>;

    /// Return a processing item to `pending`, or to `failed` once `attempts >= max_attempts`
    async fn release_for_retry(&self, id: Uuid, error: &str, max_attempts: u32) -> Result<ItemStatus>;

    /// Move every failed item back to pending with a fresh attempt count
    async fn reset_failed(&self) -> Result<u64>;

    /// Return items left in `processing` by an interrupted run to `pending`
    async fn requeue_interrupted(&self) -> Result<u64>;

    async fn get(&self, id: Uuid) -> Result<Option<WorkItem>>;

    /// Insert a new pending item
    async fn enqueue(&self, descriptor: &ItemDescriptor) -> Result<Uuid>;

    /// Audit trail of one item, oldest first
    async fn transitions(&self, id: Uuid) -> Result<Vec<StateTransition>>;
}

/// SQLite implementation of [`ItemRepository`]
pub struct SqliteItemRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    max_lock_wait_ms: u64,
}

impl SqliteItemRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    fn now_rfc3339(&self) -> String {
        self.clock.now().to_rfc3339()
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn get_pending(&self, limit: usize) -> Result<Vec<WorkItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "{} WHERE status = 'pending' ORDER BY created_at, rowid LIMIT ?",
            SELECT_ITEM
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let id_str = id.to_string();
        let now = self.now_rfc3339();

        retry_on_lock("claim", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE work_items
                SET status = 'processing', attempts = attempts + 1,
                    started_at = ?, completed_at = NULL
                WHERE id = ? AND status = 'pending'
                "#,
            )
            .bind(&now)
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                return Ok(false);
            }

            record_transition(&mut tx, &id_str, ItemStatus::Pending, ItemStatus::Processing, &now)
                .await?;
            tx.commit().await?;
            Ok(true)
        })
        .await
    }

    async fn update_status(&self, id: Uuid, status: ItemStatus, update: StatusUpdate) -> Result<()> {
        if status.is_completed() {
            return Err(Error::InvalidInput(format!(
                "{} is only entered through commit_result",
                status
            )));
        }

        let id_str = id.to_string();
        let now = self.now_rfc3339();
        let started_at = update.started_at.map(|t| t.to_rfc3339());
        let completed_at = update.completed_at.map(|t| t.to_rfc3339());

        retry_on_lock("update_status", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            let from = current_status(&mut tx, id).await?;
            ensure_legal(id, from, status)?;

            let result = sqlx::query(
                r#"
                UPDATE work_items
                SET status = ?,
                    started_at = COALESCE(?, started_at),
                    completed_at = COALESCE(?, completed_at),
                    last_error = COALESCE(?, last_error)
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(status.as_str())
            .bind(&started_at)
            .bind(&completed_at)
            .bind(&update.error)
            .bind(&id_str)
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                return Err(concurrent_change(id));
            }

            record_transition(&mut tx, &id_str, from, status, &now).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn commit_result(&self, id: Uuid, record: &EnrichedRecord, status: ItemStatus) -> Result<()> {
        if !status.is_completed() {
            return Err(Error::InvalidInput(format!(
                "commit_result requires a completed status, got {}",
                status
            )));
        }

        let id_str = id.to_string();
        let now = self.now_rfc3339();
        let enrichment = serde_json::to_string(record)
            .map_err(|e| Error::Internal(format!("Failed to serialize enrichment: {}", e)))?;
        let rating = record.rating as i64;
        let provenance = record.provenance.as_str();

        retry_on_lock("commit_result", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            let from = current_status(&mut tx, id).await?;
            ensure_legal(id, from, status)?;

            let result = sqlx::query(
                r#"
                UPDATE work_items
                SET status = ?, completed_at = ?, last_error = NULL,
                    enrichment = ?, rating = ?, provenance = ?
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(status.as_str())
            .bind(&now)
            .bind(&enrichment)
            .bind(rating)
            .bind(provenance)
            .bind(&id_str)
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                return Err(concurrent_change(id));
            }

            record_transition(&mut tx, &id_str, from, status, &now).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn release_for_retry(&self, id: Uuid, error: &str, max_attempts: u32) -> Result<ItemStatus> {
        let id_str = id.to_string();
        let now = self.now_rfc3339();

        retry_on_lock("release_for_retry", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT status, attempts FROM work_items WHERE id = ?")
                    .bind(&id_str)
                    .fetch_optional(&mut *tx)
                    .await?;
            let (status, attempts) =
                row.ok_or_else(|| Error::NotFound(format!("work item {}", id)))?;
            let from = parse_status(&status)?;

            let target = if attempts >= max_attempts as i64 {
                ItemStatus::Failed
            } else {
                ItemStatus::Pending
            };
            ensure_legal(id, from, target)?;

            let completed_at = (target == ItemStatus::Failed).then(|| now.clone());
            let result = sqlx::query(
                r#"
                UPDATE work_items
                SET status = ?, last_error = ?, completed_at = ?
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(target.as_str())
            .bind(error)
            .bind(&completed_at)
            .bind(&id_str)
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                return Err(concurrent_change(id));
            }

            record_transition(&mut tx, &id_str, from, target, &now).await?;
            tx.commit().await?;
            Ok(target)
        })
        .await
    }

    async fn reset_failed(&self) -> Result<u64> {
        let now = self.now_rfc3339();
        retry_on_lock("reset_failed", self.max_lock_wait_ms, || async {
            move_all(&self.pool, ItemStatus::Failed, ItemStatus::Pending, &now).await
        })
        .await
    }

    async fn requeue_interrupted(&self) -> Result<u64> {
        let now = self.now_rfc3339();
        retry_on_lock("requeue_interrupted", self.max_lock_wait_ms, || async {
            move_all(&self.pool, ItemStatus::Processing, ItemStatus::Pending, &now).await
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkItem>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ITEM))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn enqueue(&self, descriptor: &ItemDescriptor) -> Result<Uuid> {
        if descriptor.name.trim().is_empty() {
            return Err(Error::InvalidInput("work item name must not be empty".to_string()));
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let now = self.now_rfc3339();

        retry_on_lock("enqueue", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO work_items (
                    id, name, producer, region, country, grape, category, vintage,
                    status, attempts, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?)
                "#,
            )
            .bind(&id_str)
            .bind(&descriptor.name)
            .bind(&descriptor.producer)
            .bind(&descriptor.region)
            .bind(&descriptor.country)
            .bind(&descriptor.grape)
            .bind(descriptor.category.as_str())
            .bind(descriptor.vintage)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        tracing::debug!(item_id = %id, label = %descriptor.label(), "Enqueued work item");
        Ok(id)
    }

    async fn transitions(&self, id: Uuid) -> Result<Vec<StateTransition>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT from_status, to_status, at FROM item_transitions WHERE item_id = ? ORDER BY id",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(from, to, at)| {
                Ok(StateTransition {
                    item_id: id,
                    from: parse_status(&from)?,
                    to: parse_status(&to)?,
                    at: parse_timestamp(&at)?,
                })
            })
            .collect()
    }
}

/// Move every item in `from` to `to`, recording one transition per item
async fn move_all(pool: &SqlitePool, from: ItemStatus, to: ItemStatus, now: &str) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM work_items WHERE status = ?")
        .bind(from.as_str())
        .fetch_all(&mut *tx)
        .await?;

    // Manual retry starts a fresh attempt budget; crash recovery keeps it
    let reset_attempts = from == ItemStatus::Failed;

    for (id,) in &ids {
        sqlx::query(
            r#"
            UPDATE work_items
            SET status = ?, completed_at = NULL,
                attempts = CASE WHEN ? THEN 0 ELSE attempts END
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(reset_attempts)
        .bind(id)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        record_transition(&mut tx, id, from, to, now).await?;
    }

    tx.commit().await?;
    Ok(ids.len() as u64)
}

async fn record_transition(
    tx: &mut Transaction<'_, Sqlite>,
    item_id: &str,
    from: ItemStatus,
    to: ItemStatus,
    at: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO item_transitions (item_id, from_status, to_status, at) VALUES (?, ?, ?, ?)")
        .bind(item_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn current_status(tx: &mut Transaction<'_, Sqlite>, id: Uuid) -> Result<ItemStatus> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM work_items WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await?;

    match status {
        Some(status) => parse_status(&status),
        None => Err(Error::NotFound(format!("work item {}", id))),
    }
}

fn ensure_legal(id: Uuid, from: ItemStatus, to: ItemStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "illegal transition {} -> {} for work item {}",
            from, to, id
        )))
    }
}

fn concurrent_change(id: Uuid) -> Error {
    Error::InvalidInput(format!("work item {} changed status concurrently", id))
}

fn parse_status(value: &str) -> Result<ItemStatus> {
    value.parse::<ItemStatus>().map_err(Error::Internal)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn row_to_item(row: &SqliteRow) -> Result<WorkItem> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Invalid work item id '{}': {}", id, e)))?;

    let category: String = row.try_get("category")?;
    let vintage: Option<i64> = row.try_get("vintage")?;
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempts")?;

    let enrichment: Option<String> = row.try_get("enrichment")?;
    let enrichment = enrichment
        .map(|json| {
            serde_json::from_str::<EnrichedRecord>(&json)
                .map_err(|e| Error::Internal(format!("Failed to deserialize enrichment: {}", e)))
        })
        .transpose()?;

    Ok(WorkItem {
        id,
        descriptor: ItemDescriptor {
            name: row.try_get("name")?,
            producer: row.try_get("producer")?,
            region: row.try_get("region")?,
            country: row.try_get("country")?,
            grape: row.try_get("grape")?,
            category: WineCategory::parse_lenient(&category),
            vintage: vintage.map(|v| v as i32),
        },
        status: parse_status(&status)?,
        attempts: attempts.max(0) as u32,
        started_at: parse_optional_timestamp(row.try_get("started_at")?)?,
        completed_at: parse_optional_timestamp(row.try_get("completed_at")?)?,
        last_error: row.try_get("last_error")?,
        enrichment,
    })
}
