//! Data models for the sync engine

mod payload;
mod resilience;
mod stats;
mod sync_event;
mod sync_item;

pub use payload::{DomainPayload, EntityState, ReportStatus};
pub use resilience::{NetworkState, NetworkStatusRecord, OfflinePeriod, QueueSnapshot, SyncAttempt};
pub use stats::{HealthStatus, OfflineStatistics, QueueHealth, QueueStats, ResilienceReport};
pub use sync_event::{SyncEvent, SyncEventKind};
pub use sync_item::{ItemKind, SyncAction, SyncItem, SyncItemId, SyncStatus, UNLIMITED_RETRIES};
