//! Engine configuration
//!
//! All tuning knobs for the sync engine, constructed once at startup and
//! handed to [`crate::services::SyncEngine`]. Defaults follow the
//! behavior of the reference deployment: 30 s delivery cycles, 10 min
//! backlog snapshots, three retries per item.

use std::time::Duration;

use crate::conflict::ContentPolicy;
use crate::models::ItemKind;

/// Tuning knobs for the sync engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between worker delivery cycles
    pub sync_interval: Duration,
    /// Delay between periodic backlog snapshots
    pub snapshot_interval: Duration,
    /// Maximum items pulled per delivery cycle
    pub sync_batch_size: usize,
    /// Upper bound on a single delivery attempt
    pub delivery_timeout: Duration,
    /// Retry budget applied to enqueued items unless overridden
    pub default_max_retries: i64,
    /// Handling of significant content divergence
    pub content_policy: ContentPolicy,
    /// Auto-merge whitespace-only content differences
    pub auto_resolve_minor: bool,
    /// Changed-line budget under which diverged text is merged line-wise
    pub merge_line_threshold: usize,
    /// Storage budget available to the backlog (MB)
    pub storage_capacity_mb: f64,
    /// Age after which terminal items are pruned
    pub cleanup_retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            snapshot_interval: Duration::from_secs(600),
            sync_batch_size: 50,
            delivery_timeout: Duration::from_secs(30),
            default_max_retries: 3,
            content_policy: ContentPolicy::default(),
            auto_resolve_minor: true,
            merge_line_threshold: 10,
            storage_capacity_mb: 10_240.0,
            cleanup_retention_days: 30,
        }
    }
}

impl EngineConfig {
    /// Set the delay between worker delivery cycles
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the delay between periodic backlog snapshots
    #[must_use]
    pub const fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Set the upper bound on a single delivery attempt
    #[must_use]
    pub const fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Set the content divergence policy
    #[must_use]
    pub const fn with_content_policy(mut self, policy: ContentPolicy) -> Self {
        self.content_policy = policy;
        self
    }
}

/// Default dispatch priority for a domain kind (lower = more urgent)
///
/// Diagnostic reports carry patient findings and go first; presentation
/// state goes last.
#[must_use]
pub const fn default_priority(kind: ItemKind) -> i64 {
    match kind {
        ItemKind::Report => 1,
        ItemKind::VoiceSession => 2,
        ItemKind::Template => 3,
        ItemKind::Layout => 4,
        ItemKind::Opaque => 5,
    }
}
