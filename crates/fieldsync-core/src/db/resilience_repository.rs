//! Offline resilience repository implementation

#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)] // aggregate hour/ratio math on i64 ms values; SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{
    NetworkState, NetworkStatusRecord, OfflinePeriod, OfflineStatistics, QueueSnapshot,
    SyncAttempt,
};
use libsql::{params, Connection};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Summary of sync attempts over a reporting window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptSummary {
    /// Delivery cycles attempted
    pub attempts: i64,
    /// Cycles where every item delivered
    pub successes: i64,
    /// Items delivered across all cycles
    pub items_synced: i64,
    /// Items that failed across all cycles
    pub items_failed: i64,
}

/// Trait for resilience tracking storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ResilienceRepository {
    /// Open an offline period; returns `None` when one is already open
    async fn open_period(
        &self,
        reason: &str,
        queue_size: i64,
        storage_used_mb: f64,
    ) -> Result<Option<i64>>;

    /// Close the most recent open period; returns `None` when none is open
    async fn close_period(
        &self,
        synced_items: i64,
        queue_size: i64,
        storage_used_mb: f64,
    ) -> Result<Option<OfflinePeriod>>;

    /// The currently open period, if any
    async fn current_period(&self) -> Result<Option<OfflinePeriod>>;

    /// Append a connectivity transition record
    async fn record_network_status(
        &self,
        status: NetworkState,
        bandwidth_mbps: f64,
        latency_ms: f64,
        reason: &str,
    ) -> Result<()>;

    /// Append a delivery cycle record
    async fn record_sync_attempt(
        &self,
        success: bool,
        items_synced: i64,
        items_failed: i64,
        reason: &str,
        duration_ms: i64,
    ) -> Result<()>;

    /// Append a periodic backlog sample
    async fn record_snapshot(
        &self,
        queue_size: i64,
        storage_used_mb: f64,
        oldest_item_age_ms: i64,
        offline_duration_ms: i64,
    ) -> Result<()>;

    /// Aggregate offline behavior over the trailing window
    async fn offline_statistics(&self, window_hours: i64) -> Result<OfflineStatistics>;

    /// Aggregate sync attempts recorded after `since` (Unix ms)
    async fn attempt_summary(&self, since: i64) -> Result<AttemptSummary>;

    /// Most recent backlog samples, newest first
    async fn recent_snapshots(&self, limit: usize) -> Result<Vec<QueueSnapshot>>;

    /// Most recent delivery cycle records, newest first
    async fn recent_attempts(&self, limit: usize) -> Result<Vec<SyncAttempt>>;

    /// Most recent connectivity transitions, newest first
    async fn recent_network_status(&self, limit: usize) -> Result<Vec<NetworkStatusRecord>>;
}

/// libSQL implementation of `ResilienceRepository`
pub struct LibSqlResilienceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlResilienceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an offline period from a full row
    fn parse_period(row: &libsql::Row) -> Result<OfflinePeriod> {
        Ok(OfflinePeriod {
            id: row.get(0)?,
            started_at: row.get(1)?,
            ended_at: row.get(2)?,
            duration_ms: row.get(3)?,
            reason: row.get(4)?,
            queue_size_at_start: row.get(5)?,
            queue_size_at_end: row.get(6)?,
            synced_items_when_online: row.get(7)?,
            storage_used_at_start_mb: row.get(8)?,
            storage_used_at_end_mb: row.get(9)?,
        })
    }
}

/// Column list matching `parse_period`'s indexes
const PERIOD_COLUMNS: &str = "id, started_at, ended_at, duration_ms, reason, \
     queue_size_at_start, queue_size_at_end, synced_items_when_online, \
     storage_used_at_start_mb, storage_used_at_end_mb";

impl ResilienceRepository for LibSqlResilienceRepository<'_> {
    async fn open_period(
        &self,
        reason: &str,
        queue_size: i64,
        storage_used_mb: f64,
    ) -> Result<Option<i64>> {
        if self.current_period().await?.is_some() {
            return Ok(None);
        }

        self.conn
            .execute(
                "INSERT INTO offline_periods
                 (started_at, reason, queue_size_at_start, storage_used_at_start_mb)
                 VALUES (?, ?, ?, ?)",
                params![
                    chrono::Utc::now().timestamp_millis(),
                    reason,
                    queue_size,
                    storage_used_mb
                ],
            )
            .await?;

        let id = self.conn.last_insert_rowid();
        tracing::info!(
            "Offline period started (id {id}): {reason}; queue {queue_size}, storage {storage_used_mb:.1}MB"
        );
        Ok(Some(id))
    }

    async fn close_period(
        &self,
        synced_items: i64,
        queue_size: i64,
        storage_used_mb: f64,
    ) -> Result<Option<OfflinePeriod>> {
        let Some(period) = self.current_period().await? else {
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp_millis();
        let duration_ms = (now - period.started_at).max(0);

        self.conn
            .execute(
                "UPDATE offline_periods
                 SET ended_at = ?, duration_ms = ?, queue_size_at_end = ?,
                     synced_items_when_online = ?, storage_used_at_end_mb = ?
                 WHERE id = ?",
                params![
                    now,
                    duration_ms,
                    queue_size,
                    synced_items,
                    storage_used_mb,
                    period.id
                ],
            )
            .await?;

        tracing::info!(
            "Offline period ended after {}s; {synced_items} items synced, queue {queue_size}",
            duration_ms / 1000
        );

        let sql = format!("SELECT {PERIOD_COLUMNS} FROM offline_periods WHERE id = ?");
        let mut rows = self.conn.query(&sql, [period.id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_period(&row)?)),
            None => Ok(None),
        }
    }

    async fn current_period(&self) -> Result<Option<OfflinePeriod>> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM offline_periods
             WHERE ended_at IS NULL
             ORDER BY started_at DESC LIMIT 1"
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_period(&row)?)),
            None => Ok(None),
        }
    }

    async fn record_network_status(
        &self,
        status: NetworkState,
        bandwidth_mbps: f64,
        latency_ms: f64,
        reason: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO network_status (timestamp, status, bandwidth_mbps, latency_ms, reason)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    chrono::Utc::now().timestamp_millis(),
                    status.as_str(),
                    bandwidth_mbps,
                    latency_ms,
                    reason
                ],
            )
            .await?;

        tracing::info!("Network status: {status} ({bandwidth_mbps:.1} Mbps, {latency_ms:.0}ms)");
        Ok(())
    }

    async fn record_sync_attempt(
        &self,
        success: bool,
        items_synced: i64,
        items_failed: i64,
        reason: &str,
        duration_ms: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_attempts
                 (attempted_at, success, items_synced, items_failed, reason, duration_ms)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    chrono::Utc::now().timestamp_millis(),
                    i64::from(success),
                    items_synced,
                    items_failed,
                    reason,
                    duration_ms
                ],
            )
            .await?;
        Ok(())
    }

    async fn record_snapshot(
        &self,
        queue_size: i64,
        storage_used_mb: f64,
        oldest_item_age_ms: i64,
        offline_duration_ms: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO queue_snapshots
                 (timestamp, queue_size, storage_used_mb, oldest_item_age_ms, offline_duration_ms)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    chrono::Utc::now().timestamp_millis(),
                    queue_size,
                    storage_used_mb,
                    oldest_item_age_ms,
                    offline_duration_ms
                ],
            )
            .await?;
        Ok(())
    }

    async fn offline_statistics(&self, window_hours: i64) -> Result<OfflineStatistics> {
        let cutoff =
            chrono::Utc::now().timestamp_millis() - window_hours * 60 * 60 * 1000;

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*),
                        SUM(duration_ms),
                        MAX(duration_ms),
                        SUM(synced_items_when_online),
                        AVG(queue_size_at_start)
                 FROM offline_periods
                 WHERE started_at > ?",
                [cutoff],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(OfflineStatistics {
                window_hours,
                uptime_percent: 100.0,
                ..OfflineStatistics::default()
            });
        };

        let offline_periods: i64 = row.get(0)?;
        let total_offline_ms: Option<i64> = row.get(1)?;
        let longest_offline_ms: Option<i64> = row.get(2)?;
        let items_synced: Option<i64> = row.get(3)?;
        let average_queue_size: Option<f64> = row.get(4)?;

        let total_offline_hours = total_offline_ms.unwrap_or(0) as f64 / MS_PER_HOUR;
        let uptime_percent = if window_hours > 0 {
            (100.0 * (1.0 - total_offline_hours / window_hours as f64)).clamp(0.0, 100.0)
        } else {
            100.0
        };

        Ok(OfflineStatistics {
            window_hours,
            offline_periods,
            total_offline_hours,
            longest_offline_hours: longest_offline_ms.unwrap_or(0) as f64 / MS_PER_HOUR,
            items_synced_after_offline: items_synced.unwrap_or(0),
            average_queue_size: average_queue_size.unwrap_or(0.0).round() as i64,
            uptime_percent,
        })
    }

    async fn attempt_summary(&self, since: i64) -> Result<AttemptSummary> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*),
                        SUM(success),
                        SUM(items_synced),
                        SUM(items_failed)
                 FROM sync_attempts
                 WHERE attempted_at > ?",
                [since],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(AttemptSummary::default());
        };

        Ok(AttemptSummary {
            attempts: row.get(0)?,
            successes: row.get::<Option<i64>>(1)?.unwrap_or(0),
            items_synced: row.get::<Option<i64>>(2)?.unwrap_or(0),
            items_failed: row.get::<Option<i64>>(3)?.unwrap_or(0),
        })
    }

    async fn recent_snapshots(&self, limit: usize) -> Result<Vec<QueueSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, timestamp, queue_size, storage_used_mb, oldest_item_age_ms,
                        offline_duration_ms
                 FROM queue_snapshots ORDER BY timestamp DESC, id DESC LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut snapshots = Vec::new();
        while let Some(row) = rows.next().await? {
            snapshots.push(QueueSnapshot {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                queue_size: row.get(2)?,
                storage_used_mb: row.get(3)?,
                oldest_item_age_ms: row.get(4)?,
                offline_duration_ms: row.get(5)?,
            });
        }
        Ok(snapshots)
    }

    async fn recent_attempts(&self, limit: usize) -> Result<Vec<SyncAttempt>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, attempted_at, success, items_synced, items_failed, reason, duration_ms
                 FROM sync_attempts ORDER BY attempted_at DESC, id DESC LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut attempts = Vec::new();
        while let Some(row) = rows.next().await? {
            attempts.push(SyncAttempt {
                id: row.get(0)?,
                attempted_at: row.get(1)?,
                success: row.get::<i64>(2)? != 0,
                items_synced: row.get(3)?,
                items_failed: row.get(4)?,
                reason: row.get(5)?,
                duration_ms: row.get(6)?,
            });
        }
        Ok(attempts)
    }

    async fn recent_network_status(&self, limit: usize) -> Result<Vec<NetworkStatusRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, timestamp, status, bandwidth_mbps, latency_ms, reason
                 FROM network_status ORDER BY timestamp DESC, id DESC LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(2)?;
            records.push(NetworkStatusRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                status: status.parse()?,
                bandwidth_mbps: row.get(3)?,
                latency_ms: row.get(4)?,
                reason: row.get(5)?,
            });
        }
        Ok(records)
    }
}
