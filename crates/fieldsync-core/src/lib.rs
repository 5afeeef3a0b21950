//! fieldsync-core - Core library for fieldsync
//!
//! This crate contains the durable sync queue, the conflict detection and
//! resolution engine, and the offline resilience tracker for a
//! medical-reporting node that must keep working autonomously through
//! extended disconnections and reconcile safely when connectivity
//! returns.

pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::{EntityState, SyncItem, SyncItemId};
pub use services::{EnqueueOptions, SyncEngine};
