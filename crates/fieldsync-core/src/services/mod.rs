//! Engine services - shared store, resilience tracker, delivery worker,
//! and the engine handle that ties them together

mod engine;
mod store;
mod tracker;
mod worker;

pub use engine::{EnqueueOptions, SyncEngine};
pub use store::SyncStore;
pub use tracker::{project_queue_health, FsStorageProbe, ResilienceTracker, StorageProbe};
pub use worker::{CycleOutcome, DeliveryError, RemoteSnapshotProvider, Transport};
