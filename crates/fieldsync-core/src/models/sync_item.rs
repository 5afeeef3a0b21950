//! Sync item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::payload::EntityState;

/// A unique identifier for a sync item, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncItemId(Uuid);

impl SyncItemId {
    /// Create a new unique sync item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a sync item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Waiting to be picked up by a worker
    Pending,
    /// Claimed by a worker, delivery in flight
    Processing,
    /// Delivered successfully (terminal)
    Completed,
    /// Retries exhausted (terminal)
    Failed,
    /// Cancelled by the caller (terminal)
    Cancelled,
}

impl SyncStatus {
    /// Database column representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the status is absorbing (no further transitions)
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

/// Domain category of a sync item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Report,
    Template,
    Layout,
    VoiceSession,
    /// Payload the engine does not interpret
    Opaque,
}

impl ItemKind {
    /// Database column representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Template => "template",
            Self::Layout => "layout",
            Self::VoiceSession => "voice_session",
            Self::Opaque => "opaque",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report" => Ok(Self::Report),
            "template" => Ok(Self::Template),
            "layout" => Ok(Self::Layout),
            "voice_session" => Ok(Self::VoiceSession),
            "opaque" => Ok(Self::Opaque),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown item kind: {other}"
            ))),
        }
    }
}

/// Operation the remote side should apply for a sync item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
    Submit,
}

impl SyncAction {
    /// Database column representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Submit => "submit",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "submit" => Ok(Self::Submit),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync action: {other}"
            ))),
        }
    }
}

/// Sentinel `max_retries` value meaning unlimited retries
pub const UNLIMITED_RETRIES: i64 = -1;

/// A single pending change destined for remote delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Unique identifier
    pub id: SyncItemId,
    /// Domain category, derived from the payload kind
    pub item_type: ItemKind,
    /// Operation to apply remotely
    pub action: SyncAction,
    /// Entity snapshot to deliver
    pub payload: EntityState,
    /// Dispatch priority (lower = more urgent)
    pub priority: i64,
    /// Lifecycle status
    pub status: SyncStatus,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Earliest dispatch time (Unix ms)
    pub scheduled_at: i64,
    /// Last delivery attempt timestamp (Unix ms)
    pub attempted_at: Option<i64>,
    /// Completion timestamp (Unix ms)
    pub completed_at: Option<i64>,
    /// Delivery attempts made so far
    pub retry_count: i64,
    /// Retry budget (`UNLIMITED_RETRIES` = never give up)
    pub max_retries: i64,
    /// Most recent delivery error
    pub last_error: Option<String>,
    /// Items that must complete before this one is dispatched
    pub dependencies: Vec<SyncItemId>,
}

impl SyncItem {
    /// Create a new pending sync item
    #[must_use]
    pub fn new(action: SyncAction, payload: EntityState, priority: i64, max_retries: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: SyncItemId::new(),
            item_type: payload.body.kind(),
            action,
            payload,
            priority,
            status: SyncStatus::Pending,
            created_at: now,
            scheduled_at: now,
            attempted_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            last_error: None,
            dependencies: Vec::new(),
        }
    }

    /// Set the items this one must wait for
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<SyncItemId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Defer dispatch until the given timestamp (Unix ms)
    #[must_use]
    pub const fn with_not_before(mut self, not_before: i64) -> Self {
        self.scheduled_at = not_before;
        self
    }

    /// Whether the retry budget still allows another attempt
    #[must_use]
    pub const fn retries_remaining(&self) -> bool {
        self.max_retries == UNLIMITED_RETRIES || self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainPayload;

    fn report_state() -> EntityState {
        EntityState {
            modified_at: Some(1_700_000_000_000),
            body: DomainPayload::Report {
                content: serde_json::json!({"findings": "clear"}),
                status: None,
                metadata: serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn test_sync_item_id_unique() {
        let id1 = SyncItemId::new();
        let id2 = SyncItemId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_sync_item_id_parse() {
        let id = SyncItemId::new();
        let parsed: SyncItemId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_new_item_defaults() {
        let item = SyncItem::new(SyncAction::Create, report_state(), 1, 3);
        assert_eq!(item.status, SyncStatus::Pending);
        assert_eq!(item.item_type, ItemKind::Report);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.scheduled_at, item.created_at);
        assert!(item.dependencies.is_empty());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Processing,
            SyncStatus::Completed,
            SyncStatus::Failed,
            SyncStatus::Cancelled,
        ] {
            let parsed: SyncStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SyncStatus::Pending.is_terminal());
        assert!(!SyncStatus::Processing.is_terminal());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert!(SyncStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_retries_remaining() {
        let mut item = SyncItem::new(SyncAction::Update, report_state(), 1, 2);
        assert!(item.retries_remaining());
        item.retry_count = 2;
        assert!(!item.retries_remaining());
        item.max_retries = UNLIMITED_RETRIES;
        assert!(item.retries_remaining());
    }
}
