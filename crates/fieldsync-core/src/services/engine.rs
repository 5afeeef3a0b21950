//! Sync engine handle
//!
//! One `SyncEngine` is constructed at startup and passed by reference to
//! every call site; there is no process-wide state. `start` spawns the
//! worker loop and the snapshot ticker, `shutdown` signals both and
//! waits for them so in-flight transitions flush before the process
//! exits.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::store::SyncStore;
use super::tracker::{FsStorageProbe, ResilienceTracker, StorageProbe};
use super::worker::{run_cycle, CycleOutcome, RemoteSnapshotProvider, SyncWorker, Transport};
use crate::config::{default_priority, EngineConfig};
use crate::conflict::{detect_conflicts, ConflictResolver, Resolution};
use crate::models::{
    EntityState, NetworkState, OfflineStatistics, QueueHealth, QueueStats, ResilienceReport,
    SyncAction, SyncEvent, SyncItem, SyncItemId,
};
use crate::{Error, Result};

/// Optional settings for a single enqueue call
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Dispatch priority; per-kind default when absent
    pub priority: Option<i64>,
    /// Retry budget; config default when absent
    pub max_retries: Option<i64>,
    /// Items that must complete before this one is dispatched
    pub dependencies: Vec<SyncItemId>,
    /// Earliest dispatch time (Unix ms); now when absent
    pub not_before: Option<i64>,
}

/// The sync engine: durable queue, conflict resolution, and resilience
/// tracking behind one handle
pub struct SyncEngine {
    config: EngineConfig,
    store: SyncStore,
    tracker: ResilienceTracker,
    resolver: ConflictResolver,
    transport: Arc<dyn Transport>,
    online: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    /// Open an engine over a file-backed store
    pub async fn open(
        db_path: impl AsRef<Path>,
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let store = SyncStore::open_path(db_path.as_ref()).await?;
        Ok(Self::assemble(store, config, transport))
    }

    /// Open an engine over an in-memory store (primarily for tests)
    pub async fn open_in_memory(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let store = SyncStore::open_in_memory().await?;
        Ok(Self::assemble(store, config, transport))
    }

    fn assemble(store: SyncStore, config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let probe: Arc<dyn StorageProbe> = Arc::new(FsStorageProbe::new(
            store.db_path().map(Path::to_path_buf),
            config.storage_capacity_mb,
        ));
        let tracker = ResilienceTracker::new(store.clone(), probe);
        let resolver = ConflictResolver::new(
            config.content_policy,
            config.auto_resolve_minor,
            config.merge_line_threshold,
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            store,
            tracker,
            resolver,
            transport,
            online: Arc::new(AtomicBool::new(true)),
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Spawn the delivery worker and the snapshot ticker
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            tracing::warn!("Sync engine is already running");
            return;
        }

        let worker = SyncWorker::new(
            self.store.clone(),
            self.tracker.clone(),
            Arc::clone(&self.transport),
            self.config.clone(),
            Arc::clone(&self.online),
        );
        let shutdown_rx = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(worker.run(shutdown_rx)));

        // Single ticker task: snapshots run strictly one at a time
        let tracker = self.tracker.clone();
        let snapshot_interval = self.config.snapshot_interval;
        let mut shutdown_rx = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(snapshot_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tracker.record_queue_snapshot().await,
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));

        tracing::info!("Sync engine started");
    }

    /// Signal background tasks and wait for them to finish
    pub async fn shutdown(mut self) {
        self.shutdown.send(true).ok();
        for task in self.tasks.drain(..) {
            if let Err(error) = task.await {
                tracing::error!("Background task ended abnormally: {error}");
            }
        }
        tracing::info!("Sync engine stopped");
    }

    /// Queue a change for delivery; the sole external write entry point
    pub async fn enqueue(
        &self,
        action: SyncAction,
        payload: EntityState,
        options: EnqueueOptions,
    ) -> Result<SyncItemId> {
        let kind = payload.body.kind();
        let priority = options.priority.unwrap_or_else(|| default_priority(kind));
        let max_retries = options
            .max_retries
            .unwrap_or(self.config.default_max_retries);

        let mut item = SyncItem::new(action, payload, priority, max_retries)
            .with_dependencies(options.dependencies);
        if let Some(not_before) = options.not_before {
            item = item.with_not_before(not_before);
        }

        self.store.create_item(&item).await?;
        Ok(item.id)
    }

    /// Cancel a pending or in-flight item; false when already terminal
    pub async fn cancel(&self, id: &SyncItemId) -> Result<bool> {
        self.store.cancel(id).await
    }

    /// Current state of an item
    pub async fn get_item_status(&self, id: &SyncItemId) -> Result<Option<SyncItem>> {
        self.store.get_item(id).await
    }

    /// Audit trail of an item, newest first
    pub async fn get_item_log(&self, id: &SyncItemId) -> Result<Vec<SyncEvent>> {
        self.store.get_item_log(id).await
    }

    /// Aggregate queue counters
    pub async fn get_queue_stats(&self) -> Result<QueueStats> {
        self.store.queue_stats().await
    }

    /// Offline behavior over the trailing window
    pub async fn get_offline_statistics(&self, window_hours: i64) -> OfflineStatistics {
        self.tracker.get_offline_statistics(window_hours).await
    }

    /// Backlog sustainability projection
    pub async fn check_queue_health(&self) -> QueueHealth {
        self.tracker.check_queue_health().await
    }

    /// Composite resilience report
    pub async fn get_resilience_report(&self, period_days: i64) -> ResilienceReport {
        self.tracker.get_resilience_report(period_days).await
    }

    /// Whether delivery cycles currently run
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Signal loss of connectivity: suspend delivery and open an offline
    /// period
    pub async fn set_offline(&self, reason: &str) {
        if !self.online.swap(false, Ordering::SeqCst) {
            tracing::warn!("Already offline, ignoring transition: {reason}");
            return;
        }

        self.tracker
            .record_network_status(NetworkState::Offline, 0.0, 0.0, reason)
            .await;
        self.tracker.start_offline_period(reason).await;
    }

    /// Signal restored connectivity: run a catch-up cycle and close the
    /// offline period with its delivery count
    pub async fn set_online(&self, bandwidth_mbps: f64, latency_ms: f64) {
        if self.online.swap(true, Ordering::SeqCst) {
            tracing::warn!("Already online, ignoring transition");
            return;
        }

        self.tracker
            .record_network_status(
                NetworkState::Online,
                bandwidth_mbps,
                latency_ms,
                "connectivity restored",
            )
            .await;

        let synced = match run_cycle(&self.store, &self.tracker, &self.transport, &self.config)
            .await
        {
            Ok(outcome) => outcome.synced,
            Err(error) => {
                tracing::error!("Catch-up cycle failed: {error}");
                0
            }
        };

        self.tracker.end_offline_period(synced).await;
    }

    /// Run one immediate delivery cycle
    pub async fn force_sync(&self) -> Result<CycleOutcome> {
        if !self.is_online() {
            return Err(Error::Offline("cannot sync while offline".to_string()));
        }
        run_cycle(&self.store, &self.tracker, &self.transport, &self.config).await
    }

    /// Compare local state against the remote snapshot and resolve any
    /// divergence
    ///
    /// Returns `None` when the entity has no remote counterpart or no
    /// conflict was detected; otherwise the resolution carries the merged
    /// state, the per-conflict log, and any fields deferred to review.
    pub async fn reconcile(
        &self,
        provider: &dyn RemoteSnapshotProvider,
        entity_id: &str,
        local: &EntityState,
    ) -> Result<Option<Resolution>> {
        let Some(remote) = provider.fetch(entity_id).await? else {
            return Ok(None);
        };

        let conflicts = detect_conflicts(local, &remote);
        if conflicts.is_empty() {
            return Ok(None);
        }

        let resolution = self.resolver.resolve(&conflicts, local, &remote);
        for line in &resolution.log {
            tracing::info!("Conflict on {entity_id}: {line}");
        }
        Ok(Some(resolution))
    }

    /// Prune terminal items older than the configured retention
    pub async fn cleanup(&self) -> Result<u64> {
        self.store
            .cleanup_completed(self.config.cleanup_retention_days)
            .await
    }
}
