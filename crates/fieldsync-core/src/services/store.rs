//! Shared durable store wrapper
//!
//! The store is the single source of truth shared by workers, the
//! tracker, and the query APIs. Access is serialized through one
//! connection guarded by an async mutex; every state transition commits
//! as a single conditional statement, so a transition either fully
//! applies or is observed as a no-op.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    AttemptSummary, Database, LibSqlResilienceRepository, LibSqlSyncQueueRepository,
    ResilienceRepository, SyncQueueRepository,
};
use crate::models::{
    NetworkState, NetworkStatusRecord, OfflinePeriod, OfflineStatistics, QueueStats, SyncAttempt,
    SyncEvent, SyncItem, SyncItemId,
};
use crate::Result;

/// Thread-safe handle to the durable queue and tracker tables
#[derive(Clone)]
pub struct SyncStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl SyncStore {
    /// Open a store at the given filesystem path, creating parents as needed
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location of the database, when file-backed
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Persist a new pending item
    pub async fn create_item(&self, item: &SyncItem) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.create(item).await
    }

    /// Fetch up to `limit` dispatchable items
    pub async fn dequeue_eligible(&self, limit: usize) -> Result<Vec<SyncItem>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.dequeue_eligible(limit).await
    }

    /// Atomic `pending -> processing` claim
    pub async fn mark_processing(&self, id: &SyncItemId) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.mark_processing(id).await
    }

    /// `processing -> completed`, optionally recording a delivery result
    pub async fn mark_completed(
        &self,
        id: &SyncItemId,
        result: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.mark_completed(id, result).await
    }

    /// Delivery failure: reschedule or terminally fail
    pub async fn mark_failed(&self, id: &SyncItemId, error: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.mark_failed(id, error).await
    }

    /// Cancel a pending or in-flight item
    pub async fn cancel(&self, id: &SyncItemId) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.cancel(id).await
    }

    /// Fetch a single item by id
    pub async fn get_item(&self, id: &SyncItemId) -> Result<Option<SyncItem>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.get(id).await
    }

    /// Audit trail for an item, newest first
    pub async fn get_item_log(&self, id: &SyncItemId) -> Result<Vec<SyncEvent>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.log_for(id).await
    }

    /// Aggregate queue counters
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.stats().await
    }

    /// Count of pending items
    pub async fn pending_count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.pending_count().await
    }

    /// Count of items in non-terminal states
    pub async fn active_count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.active_count().await
    }

    /// Creation timestamp of the oldest pending item
    pub async fn oldest_pending_created_at(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.oldest_pending_created_at().await
    }

    /// Timestamp of the most recent successful delivery
    pub async fn last_sync_time(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.last_sync_time().await
    }

    /// Prune terminal items older than the cutoff
    pub async fn cleanup_completed(&self, days_old: i64) -> Result<u64> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.cleanup_completed(days_old).await
    }

    /// Open an offline period
    pub async fn open_period(
        &self,
        reason: &str,
        queue_size: i64,
        storage_used_mb: f64,
    ) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.open_period(reason, queue_size, storage_used_mb).await
    }

    /// Close the most recent open offline period
    pub async fn close_period(
        &self,
        synced_items: i64,
        queue_size: i64,
        storage_used_mb: f64,
    ) -> Result<Option<OfflinePeriod>> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.close_period(synced_items, queue_size, storage_used_mb)
            .await
    }

    /// The currently open offline period, if any
    pub async fn current_period(&self) -> Result<Option<OfflinePeriod>> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.current_period().await
    }

    /// Append a connectivity transition record
    pub async fn record_network_status(
        &self,
        status: NetworkState,
        bandwidth_mbps: f64,
        latency_ms: f64,
        reason: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.record_network_status(status, bandwidth_mbps, latency_ms, reason)
            .await
    }

    /// Append a delivery cycle record
    pub async fn record_sync_attempt(
        &self,
        success: bool,
        items_synced: i64,
        items_failed: i64,
        reason: &str,
        duration_ms: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.record_sync_attempt(success, items_synced, items_failed, reason, duration_ms)
            .await
    }

    /// Append a periodic backlog sample
    pub async fn record_snapshot(
        &self,
        queue_size: i64,
        storage_used_mb: f64,
        oldest_item_age_ms: i64,
        offline_duration_ms: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.record_snapshot(
            queue_size,
            storage_used_mb,
            oldest_item_age_ms,
            offline_duration_ms,
        )
        .await
    }

    /// Aggregate offline behavior over the trailing window
    pub async fn offline_statistics(&self, window_hours: i64) -> Result<OfflineStatistics> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.offline_statistics(window_hours).await
    }

    /// Aggregate sync attempts recorded after `since` (Unix ms)
    pub async fn attempt_summary(&self, since: i64) -> Result<AttemptSummary> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.attempt_summary(since).await
    }

    /// Most recent delivery cycle records, newest first
    pub async fn recent_attempts(&self, limit: usize) -> Result<Vec<SyncAttempt>> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.recent_attempts(limit).await
    }

    /// Most recent connectivity transitions, newest first
    pub async fn recent_network_status(&self, limit: usize) -> Result<Vec<NetworkStatusRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlResilienceRepository::new(db.connection());
        repo.recent_network_status(limit).await
    }
}
