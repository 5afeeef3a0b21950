//! Offline resilience tracking models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Connectivity state recorded on each transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Online,
    Offline,
    Degraded,
}

impl NetworkState {
    /// Database column representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "degraded" => Ok(Self::Degraded),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown network state: {other}"
            ))),
        }
    }
}

/// A contiguous interval with no connectivity to the remote authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflinePeriod {
    /// Period row identifier
    pub id: i64,
    /// Start timestamp (Unix ms)
    pub started_at: i64,
    /// End timestamp (Unix ms); `None` while the period is still open
    pub ended_at: Option<i64>,
    /// Total duration in ms, set when the period closes
    pub duration_ms: Option<i64>,
    /// Why connectivity was lost
    pub reason: String,
    /// Queue backlog when the period opened
    pub queue_size_at_start: i64,
    /// Queue backlog when the period closed
    pub queue_size_at_end: Option<i64>,
    /// Items delivered in the catch-up sync after the period closed
    pub synced_items_when_online: Option<i64>,
    /// Storage footprint when the period opened (MB)
    pub storage_used_at_start_mb: f64,
    /// Storage footprint when the period closed (MB)
    pub storage_used_at_end_mb: Option<f64>,
}

/// Append-only record of one delivery cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAttempt {
    /// Attempt row identifier
    pub id: i64,
    /// Cycle start timestamp (Unix ms)
    pub attempted_at: i64,
    /// Whether every item in the cycle delivered
    pub success: bool,
    /// Items delivered this cycle
    pub items_synced: i64,
    /// Items that failed this cycle
    pub items_failed: i64,
    /// Failure summary, empty on success
    pub reason: String,
    /// Wall-clock cycle duration in ms
    pub duration_ms: i64,
}

/// Periodic sample of backlog size and storage footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Snapshot row identifier
    pub id: i64,
    /// Capture timestamp (Unix ms)
    pub timestamp: i64,
    /// Items in non-terminal states at capture
    pub queue_size: i64,
    /// Storage footprint at capture (MB)
    pub storage_used_mb: f64,
    /// Age of the oldest pending item in ms
    pub oldest_item_age_ms: i64,
    /// How long the node had been offline at capture (0 when online)
    pub offline_duration_ms: i64,
}

/// Append-only record of a connectivity transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatusRecord {
    /// Record row identifier
    pub id: i64,
    /// Transition timestamp (Unix ms)
    pub timestamp: i64,
    /// Connectivity state after the transition
    pub status: NetworkState,
    /// Measured bandwidth (Mbps, 0 when unknown)
    pub bandwidth_mbps: f64,
    /// Measured latency (ms, 0 when unknown)
    pub latency_ms: f64,
    /// Why the transition happened
    pub reason: String,
}
