//! fieldsync CLI - operational interface for a sync node
//!
//! Inspect queue state, audit trails, and resilience reports of a
//! node's durable store, enqueue smoke-test items, and run maintenance.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::TimeZone;
use clap::{Parser, Subcommand};
use thiserror::Error;

use fieldsync_core::models::{DomainPayload, SyncAction, SyncItemId};
use fieldsync_core::services::{FsStorageProbe, ResilienceTracker, SyncStore};
use fieldsync_core::{EntityState, SyncItem};

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Inspect and maintain a fieldsync node's durable sync store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the node's database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current state of a sync item
    Status {
        /// Sync item ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the audit trail of a sync item
    Log {
        /// Sync item ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show aggregate queue counters
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Project whether the backlog can survive the current disconnection
    Health {
        /// Storage budget available to the backlog, in MB
        #[arg(long, default_value = "10240")]
        capacity_mb: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Composite resilience report
    Report {
        /// Reporting period in days
        #[arg(short, long, default_value = "7")]
        days: i64,
        /// Storage budget available to the backlog, in MB
        #[arg(long, default_value = "10240")]
        capacity_mb: f64,
    },
    /// Offline behavior over a trailing window
    OfflineStats {
        /// Window length in hours
        #[arg(long, default_value = "24")]
        hours: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recent delivery cycles and connectivity transitions
    History {
        /// Maximum records per section
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Enqueue an opaque smoke-test item
    Enqueue {
        /// Payload text
        data: Vec<String>,
        /// Dispatch priority (lower = more urgent)
        #[arg(short, long, default_value = "5")]
        priority: i64,
        /// Retry budget (-1 = unlimited)
        #[arg(long, default_value = "3")]
        max_retries: i64,
    },
    /// Cancel a pending or in-flight sync item
    Cancel {
        /// Sync item ID
        id: String,
    },
    /// Prune terminal items older than the retention cutoff
    Cleanup {
        /// Retention in days
        #[arg(short, long, default_value = "30")]
        days: i64,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid sync item ID: {0}")]
    InvalidItemId(String),
    #[error("Sync item not found: {0}")]
    ItemNotFound(String),
    #[error("No payload data provided")]
    EmptyPayload,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let db_path = cli.db_path.unwrap_or_else(default_db_path);
    let store = SyncStore::open_path(&db_path).await?;

    match cli.command {
        Commands::Status { id, json } => {
            let id = parse_id(&id)?;
            let item = store
                .get_item(&id)
                .await?
                .ok_or_else(|| CliError::ItemNotFound(id.to_string()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                print_item(&item);
            }
        }
        Commands::Log { id, json } => {
            let id = parse_id(&id)?;
            let events = store.get_item_log(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No events recorded for {id}");
            } else {
                for event in events {
                    println!(
                        "{}  {:<16} {}",
                        format_timestamp(event.timestamp),
                        event.event_type.to_string(),
                        event.message
                    );
                }
            }
        }
        Commands::Stats { json } => {
            let stats = store.queue_stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total items: {}", stats.total_items);
                for (status, count) in &stats.status_counts {
                    println!("  {status:<12} {count}");
                }
                if !stats.type_counts.is_empty() {
                    println!("Active backlog by kind:");
                    for (kind, count) in &stats.type_counts {
                        println!("  {kind:<14} {count}");
                    }
                }
                if let Some(oldest) = stats.oldest_pending_at {
                    println!("Oldest pending since: {}", format_timestamp(oldest));
                }
            }
        }
        Commands::Health { capacity_mb, json } => {
            let tracker = tracker_for(&store, capacity_mb);
            let health = tracker.check_queue_health().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Status: {}", health.health_status);
                println!("Backlog items: {}", health.queue_items);
                println!(
                    "Storage: {:.1}MB used, {:.1}MB available ({:.1}% utilized)",
                    health.storage_used_mb,
                    health.available_storage_mb,
                    health.storage_utilization_percent
                );
                match health.estimated_days_until_full {
                    Some(days) => println!(
                        "Growth: {:.2}MB/h, an estimated {days:.1} days until full",
                        health.growth_rate_mb_per_hour
                    ),
                    None => println!("Growth: none measurable"),
                }
            }
        }
        Commands::Report { days, capacity_mb } => {
            let tracker = tracker_for(&store, capacity_mb);
            let report = tracker.get_resilience_report(days).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::OfflineStats { hours, json } => {
            let tracker = tracker_for(&store, 10_240.0);
            let stats = tracker.get_offline_statistics(hours).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Window: last {} hours", stats.window_hours);
                println!("Offline periods: {}", stats.offline_periods);
                println!(
                    "Offline time: {:.2}h total, {:.2}h longest",
                    stats.total_offline_hours, stats.longest_offline_hours
                );
                println!("Uptime: {:.2}%", stats.uptime_percent);
                println!(
                    "Items synced after reconnect: {}",
                    stats.items_synced_after_offline
                );
            }
        }
        Commands::History { limit } => {
            let attempts = store.recent_attempts(limit).await?;
            println!("Delivery cycles:");
            if attempts.is_empty() {
                println!("  (none recorded)");
            }
            for attempt in attempts {
                println!(
                    "  {}  {}  {} synced, {} failed ({}ms){}",
                    format_timestamp(attempt.attempted_at),
                    if attempt.success { "ok    " } else { "failed" },
                    attempt.items_synced,
                    attempt.items_failed,
                    attempt.duration_ms,
                    if attempt.reason.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", attempt.reason)
                    }
                );
            }

            let transitions = store.recent_network_status(limit).await?;
            println!("Network transitions:");
            if transitions.is_empty() {
                println!("  (none recorded)");
            }
            for record in transitions {
                println!(
                    "  {}  {:<8} {:.1} Mbps, {:.0}ms  {}",
                    format_timestamp(record.timestamp),
                    record.status.to_string(),
                    record.bandwidth_mbps,
                    record.latency_ms,
                    record.reason
                );
            }
        }
        Commands::Enqueue {
            data,
            priority,
            max_retries,
        } => {
            let text = data.join(" ");
            if text.trim().is_empty() {
                return Err(CliError::EmptyPayload);
            }

            let payload = EntityState::new(
                Some(chrono::Utc::now().timestamp_millis()),
                DomainPayload::Opaque {
                    data: text.into_bytes(),
                },
            );
            let item = SyncItem::new(SyncAction::Create, payload, priority, max_retries);
            store.create_item(&item).await?;
            println!("Enqueued {}", item.id);
        }
        Commands::Cancel { id } => {
            let id = parse_id(&id)?;
            if store.cancel(&id).await? {
                println!("Cancelled {id}");
            } else {
                println!("{id} is already terminal; nothing to cancel");
            }
        }
        Commands::Cleanup { days } => {
            let removed = store.cleanup_completed(days).await?;
            println!("Removed {removed} items older than {days} days");
        }
    }

    Ok(())
}

/// Default store location under the platform data directory
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldsync")
        .join("fieldsync.db")
}

fn tracker_for(store: &SyncStore, capacity_mb: f64) -> ResilienceTracker {
    let probe = FsStorageProbe::new(store.db_path().map(std::path::Path::to_path_buf), capacity_mb);
    ResilienceTracker::new(store.clone(), Arc::new(probe))
}

fn parse_id(raw: &str) -> Result<SyncItemId, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidItemId(raw.to_string()))
}

fn print_item(item: &SyncItem) {
    println!("Item:        {}", item.id);
    println!("Kind:        {}", item.item_type);
    println!("Action:      {}", item.action);
    println!("Status:      {}", item.status);
    println!("Priority:    {}", item.priority);
    println!("Created:     {}", format_timestamp(item.created_at));
    println!("Scheduled:   {}", format_timestamp(item.scheduled_at));
    if let Some(attempted) = item.attempted_at {
        println!("Attempted:   {}", format_timestamp(attempted));
    }
    if let Some(completed) = item.completed_at {
        println!("Completed:   {}", format_timestamp(completed));
    }
    println!("Retries:     {}/{}", item.retry_count, item.max_retries);
    if let Some(error) = &item.last_error {
        println!("Last error:  {error}");
    }
    if !item.dependencies.is_empty() {
        println!(
            "Depends on:  {}",
            item.dependencies
                .iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}

fn format_timestamp(unix_ms: i64) -> String {
    chrono::Utc
        .timestamp_millis_opt(unix_ms)
        .single()
        .map_or_else(|| unix_ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
