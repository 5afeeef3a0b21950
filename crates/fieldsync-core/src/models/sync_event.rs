//! Sync event audit trail model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a recorded queue transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    /// Item accepted into the queue
    Queued,
    /// Worker claimed the item
    Processing,
    /// Delivery failed, retry scheduled with backoff
    RetryScheduled,
    /// Retries exhausted, item terminally failed
    Failed,
    /// Delivery succeeded
    Completed,
    /// Item cancelled by the caller
    Cancelled,
}

impl SyncEventKind {
    /// Database column representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::RetryScheduled => "retry_scheduled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncEventKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "retry_scheduled" => Ok(Self::RetryScheduled),
            "failed" => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync event kind: {other}"
            ))),
        }
    }
}

/// Append-only audit record of a queue transition; written once by the
/// queue, never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Log row identifier
    pub id: i64,
    /// Item the event belongs to
    pub sync_item_id: String,
    /// Transition kind
    pub event_type: SyncEventKind,
    /// Human-readable detail
    pub message: String,
    /// Event timestamp (Unix ms)
    pub timestamp: i64,
}
