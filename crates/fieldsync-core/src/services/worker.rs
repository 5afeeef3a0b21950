//! Delivery worker loop and collaborator seams
//!
//! Workers pull eligible items from the shared store, claim them with an
//! atomic test-and-set, and push them through the injected transport
//! under a bounded timeout. Any number of workers may run against the
//! same store; the conditional claim guarantees an item is never
//! double-dispatched.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)] // cycle durations fit in i64 ms

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use super::store::SyncStore;
use super::tracker::ResilienceTracker;
use crate::config::EngineConfig;
use crate::models::{EntityState, SyncItem};

/// Delivery failure reported by the transport
///
/// Both kinds retry up to the item's budget: apparent permanence from a
/// collaborator (rate limiting, maintenance windows) may resolve, and the
/// transport contract carries no stronger signal.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Failure expected to clear on its own (network, timeouts, 5xx)
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Failure reported as a rejection by the remote side
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// Outbound delivery seam; opaque beyond its binary outcome
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one sync item to the remote authority
    async fn deliver(&self, item: &SyncItem) -> Result<(), DeliveryError>;
}

/// Remote entity snapshot seam, used by reconciliation
#[async_trait]
pub trait RemoteSnapshotProvider: Send + Sync {
    /// Fetch the remote state of an entity, if it exists there
    async fn fetch(&self, entity_id: &str) -> crate::Result<Option<EntityState>>;
}

/// Counters from one delivery cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Items delivered this cycle
    pub synced: i64,
    /// Items that failed this cycle
    pub failed: i64,
}

/// Run one delivery cycle: claim eligible items and push each through
/// the transport under the configured timeout
pub(crate) async fn run_cycle(
    store: &SyncStore,
    tracker: &ResilienceTracker,
    transport: &Arc<dyn Transport>,
    config: &EngineConfig,
) -> crate::Result<CycleOutcome> {
    let items = store.dequeue_eligible(config.sync_batch_size).await?;
    if items.is_empty() {
        return Ok(CycleOutcome::default());
    }

    tracing::info!("Processing {} sync items", items.len());
    let started = Instant::now();
    let mut outcome = CycleOutcome::default();
    let mut first_failure = String::new();

    for item in items {
        // Lost the claim to a concurrent worker or a cancellation
        if !store.mark_processing(&item.id).await? {
            continue;
        }

        let delivery = tokio::time::timeout(config.delivery_timeout, transport.deliver(&item));
        match delivery.await {
            Ok(Ok(())) => {
                store.mark_completed(&item.id, None).await?;
                outcome.synced += 1;
            }
            Ok(Err(error)) => {
                let reason = error.to_string();
                store.mark_failed(&item.id, &reason).await?;
                if first_failure.is_empty() {
                    first_failure = reason;
                }
                outcome.failed += 1;
            }
            Err(_) => {
                let reason = format!(
                    "delivery timed out after {}s",
                    config.delivery_timeout.as_secs()
                );
                store.mark_failed(&item.id, &reason).await?;
                if first_failure.is_empty() {
                    first_failure = reason;
                }
                outcome.failed += 1;
            }
        }
    }

    tracker
        .record_sync_attempt(
            outcome.failed == 0,
            outcome.synced,
            outcome.failed,
            &first_failure,
            started.elapsed().as_millis() as i64,
        )
        .await;

    Ok(outcome)
}

/// Background loop driving delivery cycles on a fixed interval
pub(crate) struct SyncWorker {
    store: SyncStore,
    tracker: ResilienceTracker,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    online: Arc<AtomicBool>,
}

impl SyncWorker {
    pub(crate) const fn new(
        store: SyncStore,
        tracker: ResilienceTracker,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        online: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            tracker,
            transport,
            config,
            online,
        }
    }

    /// Run until the shutdown signal flips; delivery only happens while
    /// the node is online
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.sync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.online.load(Ordering::SeqCst) {
                        continue;
                    }
                    match run_cycle(&self.store, &self.tracker, &self.transport, &self.config).await {
                        Ok(outcome) if outcome.synced + outcome.failed > 0 => {
                            tracing::info!(
                                "Delivery cycle: {} synced, {} failed",
                                outcome.synced,
                                outcome.failed
                            );
                        }
                        Ok(_) => {}
                        Err(error) => {
                            tracing::error!("Delivery cycle failed: {error}");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Sync worker stopped");
    }
}
