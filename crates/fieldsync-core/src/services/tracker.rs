//! Offline resilience tracker
//!
//! Records offline-period boundaries, delivery attempts, periodic backlog
//! snapshots, and network transitions, and derives sustainability
//! projections. Recording is observability, not control flow: every
//! public operation degrades to a log line and default metrics on
//! failure instead of propagating an error.

#![allow(clippy::cast_precision_loss)] // hour math on i64 ms values

use std::path::PathBuf;
use std::sync::Arc;

use super::store::SyncStore;
use crate::models::{
    HealthStatus, NetworkState, OfflineStatistics, QueueHealth, ResilienceReport,
};
use crate::Result;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Autonomy target in days; projections below this are a warning
const SUSTAIN_TARGET_DAYS: f64 = 30.0;

/// Source of storage figures for backlog projections
pub trait StorageProbe: Send + Sync {
    /// Storage used by the backlog (MB)
    fn storage_used_mb(&self) -> f64;

    /// Storage still available to the backlog (MB)
    fn available_storage_mb(&self) -> f64;
}

/// Probe that measures the database file footprint against a fixed
/// storage budget
pub struct FsStorageProbe {
    db_path: Option<PathBuf>,
    capacity_mb: f64,
}

impl FsStorageProbe {
    /// Create a probe for the given database path and capacity budget
    #[must_use]
    pub const fn new(db_path: Option<PathBuf>, capacity_mb: f64) -> Self {
        Self {
            db_path,
            capacity_mb,
        }
    }
}

impl StorageProbe for FsStorageProbe {
    fn storage_used_mb(&self) -> f64 {
        let Some(path) = &self.db_path else {
            return 0.0;
        };
        let Some(base_name) = path.file_name().map(|name| name.to_string_lossy().to_string())
        else {
            return 0.0;
        };

        // The WAL and shared-memory sidecars count toward the footprint
        let mut total: u64 = 0;
        for suffix in ["", "-wal", "-shm"] {
            let candidate = path.with_file_name(format!("{base_name}{suffix}"));
            if let Ok(metadata) = std::fs::metadata(&candidate) {
                total += metadata.len();
            }
        }

        total as f64 / (1024.0 * 1024.0)
    }

    fn available_storage_mb(&self) -> f64 {
        (self.capacity_mb - self.storage_used_mb()).max(0.0)
    }
}

/// Backlog sustainability projection from raw inputs
///
/// `growth_rate = storage_used / hours_since_period_start`;
/// `estimated_days_until_full = available / (growth_rate * 24)`. With no
/// open offline period or no measurable growth there is nothing to
/// project and the backlog counts as healthy.
#[must_use]
pub fn project_queue_health(
    queue_items: i64,
    storage_used_mb: f64,
    available_mb: f64,
    period_age_hours: f64,
) -> QueueHealth {
    let growth_rate_mb_per_hour = if period_age_hours > 0.0 {
        storage_used_mb / period_age_hours
    } else {
        0.0
    };

    let estimated_days_until_full = if growth_rate_mb_per_hour > 0.0 {
        Some(available_mb / (growth_rate_mb_per_hour * 24.0))
    } else {
        None
    };

    let can_sustain_30_days =
        estimated_days_until_full.is_none_or(|days| days >= SUSTAIN_TARGET_DAYS);

    let total = storage_used_mb + available_mb;
    let storage_utilization_percent = if total > 0.0 {
        100.0 * storage_used_mb / total
    } else {
        0.0
    };

    QueueHealth {
        queue_items,
        storage_used_mb,
        available_storage_mb: available_mb,
        storage_utilization_percent,
        growth_rate_mb_per_hour,
        estimated_days_until_full,
        can_sustain_30_days,
        health_status: if can_sustain_30_days {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        },
    }
}

/// Tracks offline behavior and projects backlog sustainability
#[derive(Clone)]
pub struct ResilienceTracker {
    store: SyncStore,
    probe: Arc<dyn StorageProbe>,
}

impl ResilienceTracker {
    /// Create a tracker over the shared store and storage probe
    #[must_use]
    pub fn new(store: SyncStore, probe: Arc<dyn StorageProbe>) -> Self {
        Self { store, probe }
    }

    /// Mark the start of an offline period; warning no-op when one is
    /// already open
    pub async fn start_offline_period(&self, reason: &str) {
        if let Err(error) = self.try_start_offline_period(reason).await {
            tracing::error!("Failed to start offline period: {error}");
        }
    }

    async fn try_start_offline_period(&self, reason: &str) -> Result<()> {
        let queue_size = self.store.active_count().await?;
        let storage_used = self.probe.storage_used_mb();

        if self
            .store
            .open_period(reason, queue_size, storage_used)
            .await?
            .is_none()
        {
            tracing::warn!("Offline period already open, ignoring start: {reason}");
        }
        Ok(())
    }

    /// Mark the end of the current offline period; warning no-op when
    /// none is open
    pub async fn end_offline_period(&self, synced_items: i64) {
        if let Err(error) = self.try_end_offline_period(synced_items).await {
            tracing::error!("Failed to end offline period: {error}");
        }
    }

    async fn try_end_offline_period(&self, synced_items: i64) -> Result<()> {
        let queue_size = self.store.active_count().await?;
        let storage_used = self.probe.storage_used_mb();

        if self
            .store
            .close_period(synced_items, queue_size, storage_used)
            .await?
            .is_none()
        {
            tracing::warn!("No active offline period to end");
        }
        Ok(())
    }

    /// Record a connectivity transition; always succeeds
    pub async fn record_network_status(
        &self,
        status: NetworkState,
        bandwidth_mbps: f64,
        latency_ms: f64,
        reason: &str,
    ) {
        if let Err(error) = self
            .store
            .record_network_status(status, bandwidth_mbps, latency_ms, reason)
            .await
        {
            tracing::error!("Failed to record network status: {error}");
        }
    }

    /// Record a delivery cycle; always succeeds
    pub async fn record_sync_attempt(
        &self,
        success: bool,
        items_synced: i64,
        items_failed: i64,
        reason: &str,
        duration_ms: i64,
    ) {
        if let Err(error) = self
            .store
            .record_sync_attempt(success, items_synced, items_failed, reason, duration_ms)
            .await
        {
            tracing::error!("Failed to record sync attempt: {error}");
        }
    }

    /// Sample backlog size and storage footprint; always succeeds
    pub async fn record_queue_snapshot(&self) {
        if let Err(error) = self.try_record_queue_snapshot().await {
            tracing::error!("Failed to record queue snapshot: {error}");
        }
    }

    async fn try_record_queue_snapshot(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let queue_size = self.store.active_count().await?;
        let storage_used = self.probe.storage_used_mb();

        let oldest_item_age_ms = self
            .store
            .oldest_pending_created_at()
            .await?
            .map_or(0, |created_at| (now - created_at).max(0));

        let offline_duration_ms = self
            .store
            .current_period()
            .await?
            .map_or(0, |period| (now - period.started_at).max(0));

        self.store
            .record_snapshot(queue_size, storage_used, oldest_item_age_ms, offline_duration_ms)
            .await
    }

    /// Aggregate offline behavior over the trailing window; degrades to
    /// empty statistics on failure
    pub async fn get_offline_statistics(&self, window_hours: i64) -> OfflineStatistics {
        match self.store.offline_statistics(window_hours).await {
            Ok(stats) => stats,
            Err(error) => {
                tracing::error!("Failed to get offline statistics: {error}");
                OfflineStatistics {
                    window_hours,
                    uptime_percent: 100.0,
                    ..OfflineStatistics::default()
                }
            }
        }
    }

    /// Project whether the backlog can survive the current disconnection;
    /// degrades to an empty healthy projection on failure
    pub async fn check_queue_health(&self) -> QueueHealth {
        match self.try_check_queue_health().await {
            Ok(health) => health,
            Err(error) => {
                tracing::error!("Failed to check queue health: {error}");
                project_queue_health(0, 0.0, self.probe.available_storage_mb(), 0.0)
            }
        }
    }

    async fn try_check_queue_health(&self) -> Result<QueueHealth> {
        let queue_items = self.store.active_count().await?;
        let storage_used = self.probe.storage_used_mb();
        let available = self.probe.available_storage_mb();

        let period_age_hours = self.store.current_period().await?.map_or(0.0, |period| {
            let now = chrono::Utc::now().timestamp_millis();
            (now - period.started_at).max(0) as f64 / MS_PER_HOUR
        });

        Ok(project_queue_health(
            queue_items,
            storage_used,
            available,
            period_age_hours,
        ))
    }

    /// Composite resilience report over the reporting period; degrades to
    /// a default report on failure
    pub async fn get_resilience_report(&self, period_days: i64) -> ResilienceReport {
        let offline = self.get_offline_statistics(period_days * 24).await;
        let queue_health = self.check_queue_health().await;

        let since = chrono::Utc::now().timestamp_millis() - period_days * 24 * 60 * 60 * 1000;
        let attempts = match self.store.attempt_summary(since).await {
            Ok(summary) => summary,
            Err(error) => {
                tracing::error!("Failed to summarize sync attempts: {error}");
                crate::db::AttemptSummary::default()
            }
        };

        let sync_success_rate_percent = if attempts.attempts > 0 {
            100.0 * attempts.successes as f64 / attempts.attempts as f64
        } else {
            0.0
        };

        let battle_ready = offline.uptime_percent >= 99.0 && sync_success_rate_percent >= 99.0;

        ResilienceReport {
            period_days,
            offline_events: offline.offline_periods,
            total_offline_hours: offline.total_offline_hours,
            longest_offline_hours: offline.longest_offline_hours,
            uptime_percent: offline.uptime_percent,
            sync_attempts: attempts.attempts,
            sync_success_rate_percent,
            total_items_synced: attempts.items_synced,
            queue_health,
            battle_ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedProbe {
        used: f64,
        available: f64,
    }

    impl StorageProbe for FixedProbe {
        fn storage_used_mb(&self) -> f64 {
            self.used
        }

        fn available_storage_mb(&self) -> f64 {
            self.available
        }
    }

    async fn tracker_with(used: f64, available: f64) -> ResilienceTracker {
        let store = SyncStore::open_in_memory().await.unwrap();
        ResilienceTracker::new(store, Arc::new(FixedProbe { used, available }))
    }

    #[test]
    fn test_projection_warns_below_thirty_days() {
        // 50MB/hour growth against 10GB available: ~8.33 days of runway
        let health = project_queue_health(100, 50.0, 10_000.0, 1.0);
        assert!((health.growth_rate_mb_per_hour - 50.0).abs() < f64::EPSILON);
        let days = health.estimated_days_until_full.unwrap();
        assert!((days - 8.33).abs() < 0.01);
        assert!(!health.can_sustain_30_days);
        assert_eq!(health.health_status, HealthStatus::Warning);
    }

    #[test]
    fn test_projection_healthy_with_slow_growth() {
        // 1MB/hour against 10GB: over 400 days of runway
        let health = project_queue_health(5, 2.0, 10_000.0, 2.0);
        assert!(health.estimated_days_until_full.unwrap() > 400.0);
        assert!(health.can_sustain_30_days);
        assert_eq!(health.health_status, HealthStatus::Healthy);
    }

    #[test]
    fn test_projection_no_growth_is_healthy() {
        let health = project_queue_health(0, 0.0, 10_000.0, 0.0);
        assert!(health.estimated_days_until_full.is_none());
        assert!(health.can_sustain_30_days);
        assert_eq!(health.health_status, HealthStatus::Healthy);
    }

    #[test]
    fn test_projection_utilization() {
        let health = project_queue_health(0, 2_500.0, 7_500.0, 0.0);
        assert!((health.storage_utilization_percent - 25.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_start_leaves_one_open_period() {
        let tracker = tracker_with(1.0, 100.0).await;

        tracker.start_offline_period("satellite link down").await;
        tracker.start_offline_period("second call").await;

        let period = tracker.store.current_period().await.unwrap().unwrap();
        assert_eq!(period.reason, "satellite link down");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_end_without_open_period_is_noop() {
        let tracker = tracker_with(1.0, 100.0).await;
        // Must not panic or error
        tracker.end_offline_period(0).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snapshot_records_offline_duration() {
        let tracker = tracker_with(1.0, 100.0).await;

        tracker.start_offline_period("outage").await;
        tracker.record_queue_snapshot().await;

        let stats = tracker.get_offline_statistics(24).await;
        assert_eq!(stats.offline_periods, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resilience_report_battle_ready() {
        let tracker = tracker_with(1.0, 100_000.0).await;

        for _ in 0..10 {
            tracker.record_sync_attempt(true, 3, 0, "", 500).await;
        }

        let report = tracker.get_resilience_report(7).await;
        assert_eq!(report.sync_attempts, 10);
        assert!((report.sync_success_rate_percent - 100.0).abs() < f64::EPSILON);
        assert!((report.uptime_percent - 100.0).abs() < f64::EPSILON);
        assert!(report.battle_ready);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resilience_report_not_ready_after_failures() {
        let tracker = tracker_with(1.0, 100_000.0).await;

        tracker.record_sync_attempt(true, 3, 0, "", 500).await;
        tracker
            .record_sync_attempt(false, 0, 3, "unreachable", 500)
            .await;

        let report = tracker.get_resilience_report(7).await;
        assert!((report.sync_success_rate_percent - 50.0).abs() < f64::EPSILON);
        assert!(!report.battle_ready);
    }
}
