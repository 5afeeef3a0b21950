//! Sync queue repository implementation

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)] // SQLite uses i64 for LIMIT and counters

use crate::error::{Error, Result};
use crate::models::{
    QueueStats, SyncEvent, SyncEventKind, SyncItem, SyncItemId, SyncStatus, UNLIMITED_RETRIES,
};
use libsql::{params, Connection};
use std::time::Duration;

/// Base retry delay in seconds
const BACKOFF_BASE_SECS: i64 = 30;

/// Upper bound on the retry delay in seconds
const BACKOFF_CAP_SECS: i64 = 300;

/// Exponential retry delay: `min(300s, 30s * 2^n)`
///
/// Non-decreasing in `n` and capped so a long-failing item keeps probing
/// the transport every five minutes instead of backing off forever.
#[must_use]
pub fn backoff(retry_count: i64) -> Duration {
    let exp = retry_count.clamp(0, 10);
    let secs = (BACKOFF_BASE_SECS << exp).min(BACKOFF_CAP_SECS);
    Duration::from_secs(secs as u64)
}

/// Trait for durable queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncQueueRepository {
    /// Persist a new pending item and append its `queued` event
    async fn create(&self, item: &SyncItem) -> Result<()>;

    /// Fetch up to `limit` dispatchable items: pending, due, retries
    /// remaining, all dependencies completed; priority then FIFO order
    async fn dequeue_eligible(&self, limit: usize) -> Result<Vec<SyncItem>>;

    /// Atomic `pending -> processing` test-and-set; false when the item
    /// is not currently pending
    async fn mark_processing(&self, id: &SyncItemId) -> Result<bool>;

    /// `processing -> completed`; false (no-op) on any other state. An
    /// optional delivery result is recorded in the completion event
    async fn mark_completed(
        &self,
        id: &SyncItemId,
        result: Option<&serde_json::Value>,
    ) -> Result<bool>;

    /// Delivery failure: reschedule with backoff while retries remain,
    /// otherwise transition to terminal `failed`
    async fn mark_failed(&self, id: &SyncItemId, error: &str) -> Result<bool>;

    /// `pending|processing -> cancelled`; false (no-op) on terminal states
    async fn cancel(&self, id: &SyncItemId) -> Result<bool>;

    /// Fetch a single item by id
    async fn get(&self, id: &SyncItemId) -> Result<Option<SyncItem>>;

    /// Audit trail for an item, newest first
    async fn log_for(&self, id: &SyncItemId) -> Result<Vec<SyncEvent>>;

    /// Aggregate queue counters
    async fn stats(&self) -> Result<QueueStats>;

    /// Count of pending items
    async fn pending_count(&self) -> Result<i64>;

    /// Count of items in non-terminal states
    async fn active_count(&self) -> Result<i64>;

    /// Creation timestamp of the oldest pending item
    async fn oldest_pending_created_at(&self) -> Result<Option<i64>>;

    /// Timestamp of the most recent successful delivery
    async fn last_sync_time(&self) -> Result<Option<i64>>;

    /// Prune terminal items older than `days_old` days plus orphaned
    /// log rows; returns the number of items removed
    async fn cleanup_completed(&self, days_old: i64) -> Result<u64>;
}

/// libSQL implementation of `SyncQueueRepository`
pub struct LibSqlSyncQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append an audit event for an item
    async fn log_event(&self, id: &SyncItemId, kind: SyncEventKind, message: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_log (sync_item_id, event_type, message, timestamp)
                 VALUES (?, ?, ?, ?)",
                params![
                    id.as_str(),
                    kind.as_str(),
                    message,
                    chrono::Utc::now().timestamp_millis()
                ],
            )
            .await?;
        Ok(())
    }

    /// Parse a sync item from a full queue row
    fn parse_item(row: &libsql::Row) -> Result<SyncItem> {
        let id: String = row.get(0)?;
        let item_type: String = row.get(1)?;
        let action: String = row.get(2)?;
        let payload: String = row.get(3)?;
        let status: String = row.get(5)?;
        let dependencies: Option<String> = row.get(13)?;

        Ok(SyncItem {
            id: id
                .parse()
                .map_err(|_| Error::InvalidInput(format!("invalid sync item id: {id}")))?,
            item_type: item_type.parse()?,
            action: action.parse()?,
            payload: serde_json::from_str(&payload)?,
            priority: row.get(4)?,
            status: status.parse()?,
            created_at: row.get(6)?,
            scheduled_at: row.get(7)?,
            attempted_at: row.get(8)?,
            completed_at: row.get(9)?,
            retry_count: row.get(10)?,
            max_retries: row.get(11)?,
            last_error: row.get(12)?,
            dependencies: match dependencies {
                Some(json) => serde_json::from_str(&json)?,
                None => Vec::new(),
            },
        })
    }
}

/// Column list matching `parse_item`'s indexes
const ITEM_COLUMNS: &str = "id, item_type, action, payload, priority, status, created_at, \
     scheduled_at, attempted_at, completed_at, retry_count, max_retries, last_error, dependencies";

impl SyncQueueRepository for LibSqlSyncQueueRepository<'_> {
    async fn create(&self, item: &SyncItem) -> Result<()> {
        let payload = serde_json::to_string(&item.payload)?;
        let dependencies = if item.dependencies.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&item.dependencies)?)
        };

        self.conn
            .execute(
                "INSERT INTO sync_queue
                 (id, item_type, action, payload, priority, status, created_at, scheduled_at,
                  retry_count, max_retries, dependencies)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id.as_str(),
                    item.item_type.as_str(),
                    item.action.as_str(),
                    payload,
                    item.priority,
                    item.status.as_str(),
                    item.created_at,
                    item.scheduled_at,
                    item.retry_count,
                    item.max_retries,
                    dependencies
                ],
            )
            .await?;

        self.log_event(
            &item.id,
            SyncEventKind::Queued,
            &format!("Added {} action: {}", item.item_type, item.action),
        )
        .await?;

        tracing::debug!("Added sync item: {} ({}:{})", item.id, item.item_type, item.action);
        Ok(())
    }

    async fn dequeue_eligible(&self, limit: usize) -> Result<Vec<SyncItem>> {
        let now = chrono::Utc::now().timestamp_millis();

        // The dependency filter runs inside the query so LIMIT applies to
        // truly eligible items; a dependency id with no matching row
        // counts as unmet.
        let sql = format!(
            "SELECT {ITEM_COLUMNS}
             FROM sync_queue AS q
             WHERE q.status = 'pending'
               AND q.scheduled_at <= ?
               AND (q.retry_count < q.max_retries OR q.max_retries = {UNLIMITED_RETRIES})
               AND (q.dependencies IS NULL OR NOT EXISTS (
                   SELECT 1 FROM json_each(q.dependencies) AS dep
                   LEFT JOIN sync_queue AS d ON d.id = dep.value
                   WHERE d.id IS NULL OR d.status != 'completed'
               ))
             ORDER BY q.priority ASC, q.created_at ASC
             LIMIT ?"
        );

        let mut rows = self.conn.query(&sql, params![now, limit as i64]).await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }

        tracing::debug!("Retrieved {} eligible sync items", items.len());
        Ok(items)
    }

    async fn mark_processing(&self, id: &SyncItemId) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET status = 'processing', attempted_at = ?, retry_count = retry_count + 1
                 WHERE id = ? AND status = 'pending'",
                params![chrono::Utc::now().timestamp_millis(), id.as_str()],
            )
            .await?;

        if affected == 0 {
            return Ok(false);
        }

        self.log_event(id, SyncEventKind::Processing, "Started processing")
            .await?;
        Ok(true)
    }

    async fn mark_completed(
        &self,
        id: &SyncItemId,
        result: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET status = 'completed', completed_at = ?, last_error = NULL
                 WHERE id = ? AND status = 'processing'",
                params![chrono::Utc::now().timestamp_millis(), id.as_str()],
            )
            .await?;

        if affected == 0 {
            return Ok(false);
        }

        let message = match result {
            Some(value) => format!("Successfully completed: {value}"),
            None => "Successfully completed".to_string(),
        };
        self.log_event(id, SyncEventKind::Completed, &message).await?;
        tracing::debug!("Marked sync item as completed: {id}");
        Ok(true)
    }

    async fn mark_failed(&self, id: &SyncItemId, error: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT retry_count, max_retries FROM sync_queue
                 WHERE id = ? AND status = 'processing'",
                [id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(false);
        };
        let retry_count: i64 = row.get(0)?;
        let max_retries: i64 = row.get(1)?;

        if max_retries == UNLIMITED_RETRIES || retry_count < max_retries {
            let delay = backoff(retry_count);
            let scheduled_at =
                chrono::Utc::now().timestamp_millis() + (delay.as_millis() as i64);

            let affected = self
                .conn
                .execute(
                    "UPDATE sync_queue
                     SET status = 'pending', last_error = ?, scheduled_at = ?
                     WHERE id = ? AND status = 'processing'",
                    params![error, scheduled_at, id.as_str()],
                )
                .await?;
            if affected == 0 {
                return Ok(false);
            }

            self.log_event(
                id,
                SyncEventKind::RetryScheduled,
                &format!("Scheduled for retry in {}s: {error}", delay.as_secs()),
            )
            .await?;
        } else {
            let affected = self
                .conn
                .execute(
                    "UPDATE sync_queue
                     SET status = 'failed', last_error = ?
                     WHERE id = ? AND status = 'processing'",
                    params![error, id.as_str()],
                )
                .await?;
            if affected == 0 {
                return Ok(false);
            }

            self.log_event(
                id,
                SyncEventKind::Failed,
                &format!("Permanently failed: {error}"),
            )
            .await?;
        }

        tracing::debug!("Marked sync item as failed: {id}");
        Ok(true)
    }

    async fn cancel(&self, id: &SyncItemId) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET status = 'cancelled'
                 WHERE id = ? AND status IN ('pending', 'processing')",
                [id.as_str()],
            )
            .await?;

        if affected == 0 {
            return Ok(false);
        }

        self.log_event(id, SyncEventKind::Cancelled, "Item cancelled by caller")
            .await?;
        tracing::debug!("Cancelled sync item: {id}");
        Ok(true)
    }

    async fn get(&self, id: &SyncItemId) -> Result<Option<SyncItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM sync_queue WHERE id = ?");
        let mut rows = self.conn.query(&sql, [id.as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn log_for(&self, id: &SyncItemId) -> Result<Vec<SyncEvent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, event_type, message, timestamp FROM sync_log
                 WHERE sync_item_id = ? ORDER BY timestamp DESC, id DESC",
                [id.as_str()],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            let event_type: String = row.get(1)?;
            events.push(SyncEvent {
                id: row.get(0)?,
                sync_item_id: id.as_str(),
                event_type: event_type.parse()?,
                message: row.get(2)?,
                timestamp: row.get(3)?,
            });
        }

        Ok(events)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();

        let mut rows = self
            .conn
            .query("SELECT status, COUNT(*) FROM sync_queue GROUP BY status", ())
            .await?;
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.total_items += count;
            stats.status_counts.insert(status, count);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT item_type, COUNT(*) FROM sync_queue
                 WHERE status IN ('pending', 'processing')
                 GROUP BY item_type",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let item_type: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            stats.type_counts.insert(item_type, count);
        }

        stats.oldest_pending_at = self.oldest_pending_created_at().await?;
        Ok(stats)
    }

    async fn pending_count(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
                (),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    async fn active_count(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM sync_queue WHERE status IN ('pending', 'processing')",
                (),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    async fn oldest_pending_created_at(&self) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT MIN(created_at) FROM sync_queue WHERE status = 'pending'",
                (),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    async fn last_sync_time(&self) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT MAX(completed_at) FROM sync_queue WHERE status = 'completed'",
                (),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    async fn cleanup_completed(&self, days_old: i64) -> Result<u64> {
        let cutoff =
            chrono::Utc::now().timestamp_millis() - days_old * 24 * 60 * 60 * 1000;

        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue
                 WHERE status IN ('completed', 'cancelled', 'failed')
                 AND COALESCE(completed_at, attempted_at, created_at) < ?",
                [cutoff],
            )
            .await?;

        self.conn
            .execute(
                "DELETE FROM sync_log
                 WHERE sync_item_id NOT IN (SELECT id FROM sync_queue)",
                (),
            )
            .await?;

        tracing::info!("Cleaned up {removed} old sync queue items");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{DomainPayload, EntityState, SyncAction};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn layout_item(priority: i64, max_retries: i64) -> SyncItem {
        let payload = EntityState::new(
            Some(1_700_000_000_000),
            DomainPayload::Layout {
                configuration: serde_json::json!({"columns": 2}),
            },
        );
        SyncItem::new(SyncAction::Update, payload, priority, max_retries)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(3, 3);
        repo.create(&item).await.unwrap();

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched, item);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_returns_none() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let missing = repo.get(&SyncItemId::new()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dequeue_priority_then_fifo() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let low = layout_item(5, 3);
        let urgent = layout_item(1, 3);
        repo.create(&low).await.unwrap();
        repo.create(&urgent).await.unwrap();

        let eligible = repo.dequeue_eligible(1).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, urgent.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dequeue_excludes_future_scheduled() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        let item = layout_item(1, 3).with_not_before(future);
        repo.create(&item).await.unwrap();

        assert!(repo.dequeue_eligible(10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dequeue_excludes_unmet_dependencies() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let a = layout_item(1, 3);
        let b = layout_item(1, 3).with_dependencies(vec![a.id]);
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        let eligible = repo.dequeue_eligible(10).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, a.id);

        assert!(repo.mark_processing(&a.id).await.unwrap());
        assert!(repo.mark_completed(&a.id, None).await.unwrap());

        let eligible = repo.dequeue_eligible(10).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, b.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dependency_on_unknown_item_blocks() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3).with_dependencies(vec![SyncItemId::new()]);
        repo.create(&item).await.unwrap();

        assert!(repo.dequeue_eligible(10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_processing_single_claim() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();

        assert!(repo.mark_processing(&item.id).await.unwrap());
        // Second claim must observe a no-op
        assert!(!repo.mark_processing(&item.id).await.unwrap());

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Processing);
        assert_eq!(fetched.retry_count, 1);
        assert!(fetched.attempted_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_completed_idempotent() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();
        assert!(repo.mark_processing(&item.id).await.unwrap());
        assert!(repo.mark_completed(&item.id, None).await.unwrap());
        assert!(!repo.mark_completed(&item.id, None).await.unwrap());

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Completed);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_completed_records_result() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();
        assert!(repo.mark_processing(&item.id).await.unwrap());

        let result = serde_json::json!({"remote_id": "rep-991"});
        assert!(repo.mark_completed(&item.id, Some(&result)).await.unwrap());

        let events = repo.log_for(&item.id).await.unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type == SyncEventKind::Completed && e.message.contains("rep-991")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_failed_reschedules_with_backoff() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();
        assert!(repo.mark_processing(&item.id).await.unwrap());

        let before = chrono::Utc::now().timestamp_millis();
        assert!(repo.mark_failed(&item.id, "connection reset").await.unwrap());

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Pending);
        assert_eq!(fetched.last_error.as_deref(), Some("connection reset"));
        // retry_count was 1 when the failure landed: 60s delay
        assert!(fetched.scheduled_at >= before + 60_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retry_exhaustion_terminal_failure() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();

        // mark_processing succeeds on pending items regardless of
        // scheduled_at, so the retry loop can run without waiting out
        // the backoff delays
        loop {
            assert!(repo.mark_processing(&item.id).await.unwrap());
            repo.mark_failed(&item.id, "unreachable").await.unwrap();
            let current = repo.get(&item.id).await.unwrap().unwrap();
            if current.status.is_terminal() {
                break;
            }
        }

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Failed);
        assert_eq!(fetched.retry_count, fetched.max_retries);

        let failed_events: Vec<_> = repo
            .log_for(&item.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == SyncEventKind::Failed)
            .collect();
        assert_eq!(failed_events.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unlimited_retries_never_terminal() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, UNLIMITED_RETRIES);
        repo.create(&item).await.unwrap();

        for _ in 0..5 {
            assert!(repo.mark_processing(&item.id).await.unwrap());
            assert!(repo.mark_failed(&item.id, "still down").await.unwrap());
        }

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Pending);
        assert_eq!(fetched.retry_count, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_pending_and_terminal_noop() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();

        assert!(repo.cancel(&item.id).await.unwrap());
        assert!(!repo.cancel(&item.id).await.unwrap());

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_beats_mark_processing() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();

        assert!(repo.cancel(&item.id).await.unwrap());
        // The losing claim observes a no-op
        assert!(!repo.mark_processing(&item.id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_processing_beats_cancel_then_failure_noop() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let item = layout_item(1, 3);
        repo.create(&item).await.unwrap();

        assert!(repo.mark_processing(&item.id).await.unwrap());
        // Cancellation of an in-flight item still wins over the worker's
        // eventual verdict
        assert!(repo.cancel(&item.id).await.unwrap());
        assert!(!repo.mark_failed(&item.id, "late failure").await.unwrap());
        assert!(!repo.mark_completed(&item.id, None).await.unwrap());

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stats_counts() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let a = layout_item(1, 3);
        let b = layout_item(2, 3);
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();
        assert!(repo.mark_processing(&a.id).await.unwrap());
        assert!(repo.mark_completed(&a.id, None).await.unwrap());

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.status_counts.get("completed"), Some(&1));
        assert_eq!(stats.status_counts.get("pending"), Some(&1));
        assert_eq!(stats.type_counts.get("layout"), Some(&1));
        assert_eq!(stats.oldest_pending_at, Some(b.created_at));

        assert_eq!(repo.pending_count().await.unwrap(), 1);
        assert_eq!(repo.active_count().await.unwrap(), 1);
        assert!(repo.last_sync_time().await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cleanup_prunes_old_terminal_items() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let old = layout_item(1, 3);
        let fresh = layout_item(1, 3);
        repo.create(&old).await.unwrap();
        repo.create(&fresh).await.unwrap();
        assert!(repo.mark_processing(&old.id).await.unwrap());
        assert!(repo.mark_completed(&old.id, None).await.unwrap());

        // Age the completed item past the cutoff
        let ancient = chrono::Utc::now().timestamp_millis() - 40 * 24 * 60 * 60 * 1000;
        db.connection()
            .execute(
                "UPDATE sync_queue SET completed_at = ? WHERE id = ?",
                params![ancient, old.id.as_str()],
            )
            .await
            .unwrap();

        let removed = repo.cleanup_completed(30).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get(&old.id).await.unwrap().is_none());
        assert!(repo.get(&fresh.id).await.unwrap().is_some());
        assert!(repo.log_for(&old.id).await.unwrap().is_empty());
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff(0), Duration::from_secs(30));
        assert_eq!(backoff(1), Duration::from_secs(60));
        assert_eq!(backoff(2), Duration::from_secs(120));
        assert_eq!(backoff(3), Duration::from_secs(240));
        assert_eq!(backoff(4), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_non_decreasing_and_capped() {
        let mut previous = Duration::ZERO;
        for n in 0..20 {
            let delay = backoff(n);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(300));
            previous = delay;
        }
    }
}
