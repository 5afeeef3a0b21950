//! Derived statistics and health reports

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Item counts by status
    pub status_counts: BTreeMap<String, i64>,
    /// Pending/processing item counts by domain kind
    pub type_counts: BTreeMap<String, i64>,
    /// Creation timestamp of the oldest pending item (Unix ms)
    pub oldest_pending_at: Option<i64>,
    /// Total items in the queue, terminal states included
    pub total_items: i64,
}

/// Offline behavior aggregated over a reporting window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineStatistics {
    /// Window length in hours
    pub window_hours: i64,
    /// Offline periods that started inside the window
    pub offline_periods: i64,
    /// Total offline time in hours
    pub total_offline_hours: f64,
    /// Longest single offline period in hours
    pub longest_offline_hours: f64,
    /// Items delivered in catch-up syncs after periods closed
    pub items_synced_after_offline: i64,
    /// Mean queue backlog at period start
    pub average_queue_size: i64,
    /// Percentage of the window spent online
    pub uptime_percent: f64,
}

/// Health verdict of the backlog projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Projected runway covers the 30-day autonomy target
    Healthy,
    /// Projected runway falls short of the 30-day autonomy target
    Warning,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// Backlog sustainability projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueHealth {
    /// Items currently in non-terminal states
    pub queue_items: i64,
    /// Storage used by the backlog (MB)
    pub storage_used_mb: f64,
    /// Storage still available (MB)
    pub available_storage_mb: f64,
    /// Used fraction of total storage, as a percentage
    pub storage_utilization_percent: f64,
    /// Observed backlog growth (MB per hour); 0 outside offline periods
    pub growth_rate_mb_per_hour: f64,
    /// Projected days until storage is exhausted; `None` when there is
    /// no measurable growth
    pub estimated_days_until_full: Option<f64>,
    /// Whether the projection covers the 30-day autonomy target
    pub can_sustain_30_days: bool,
    /// Overall verdict
    pub health_status: HealthStatus,
}

/// Composite resilience report over a reporting period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceReport {
    /// Reporting period in days
    pub period_days: i64,
    /// Offline periods in the reporting period
    pub offline_events: i64,
    /// Total offline time in hours
    pub total_offline_hours: f64,
    /// Longest single offline period in hours
    pub longest_offline_hours: f64,
    /// Percentage of the period spent online
    pub uptime_percent: f64,
    /// Delivery cycles attempted
    pub sync_attempts: i64,
    /// Percentage of delivery cycles that fully succeeded
    pub sync_success_rate_percent: f64,
    /// Total items delivered across all cycles
    pub total_items_synced: i64,
    /// Current backlog projection
    pub queue_health: QueueHealth,
    /// Sustained high uptime and sync success over the period
    pub battle_ready: bool,
}
