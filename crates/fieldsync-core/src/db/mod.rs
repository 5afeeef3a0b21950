//! Database layer - connection management, migrations, and repositories

mod connection;
mod migrations;
mod queue_repository;
mod resilience_repository;

pub use connection::Database;
pub use queue_repository::{backoff, LibSqlSyncQueueRepository, SyncQueueRepository};
pub use resilience_repository::{AttemptSummary, LibSqlResilienceRepository, ResilienceRepository};
