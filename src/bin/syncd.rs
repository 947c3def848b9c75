//! `syncd` — the sync engine's CLI entry point (SPEC_FULL §5 [ADDED]).
//!
//! Loads configuration, bootstraps the schema and dependency graph through
//! `SyncCoordinator`, dispatches a single operator command, and wires
//! Ctrl+C/SIGTERM to the cooperative cancellation token so an in-flight sync
//! can leave its progress row `error_recoverable` instead of just dying.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use fulfillment_sync_engine::cancellation::SyncCancellation;
use fulfillment_sync_engine::entity::EntityKind;
use fulfillment_sync_engine::SyncCoordinator;
use shared::Config;

#[derive(Parser)]
#[command(name = "syncd", about = "Fulfillment vendor sync engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync every entity kind concurrently.
    SyncAll {
        /// Force a full resync instead of the default incremental window.
        #[arg(long)]
        full: bool,
    },
    /// Sync a single entity kind.
    SyncEntity {
        entity: String,
        #[arg(long)]
        full: bool,
        /// Sync only records updated within the last N days.
        #[arg(long)]
        days: Option<i64>,
    },
    /// Resume a previously failed or interrupted sync by its sync_id.
    Retry { sync_id: String },
    /// Print an entity's most recent sync status.
    Status { entity: String },
    /// Print an entity's total row count as tracked by SyncStatus.
    Count { entity: String },
}

fn parse_entity(raw: &str) -> Result<EntityKind> {
    raw.parse::<EntityKind>()
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("unknown entity kind '{raw}'"))
}

async fn shutdown_signal(cancel: SyncCancellation) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, cancelling in-flight sync");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_level.clone()))
        .init();

    let cli = Cli::parse();
    let cancel = SyncCancellation::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let coordinator = SyncCoordinator::new(&config)
        .await
        .context("initializing sync coordinator")?;

    match cli.command {
        Command::SyncAll { full } => {
            let outcomes = coordinator.sync_all(full, cancel).await;
            let mut any_failed = false;
            for (entity_kind, outcome) in outcomes {
                match outcome {
                    Ok(o) if o.success => {
                        info!(entity = %entity_kind, items = o.items_processed, "sync succeeded");
                    }
                    Ok(o) => {
                        any_failed = true;
                        error!(entity = %entity_kind, error = ?o.error, "sync failed");
                    }
                    Err(e) => {
                        any_failed = true;
                        error!(entity = %entity_kind, error = %e, "sync could not start");
                    }
                }
            }
            if any_failed {
                std::process::exit(1);
            }
        }
        Command::SyncEntity { entity, full, days } => {
            let entity_kind = parse_entity(&entity)?;
            let mode = match (full, days) {
                (true, _) => fulfillment_sync_engine::progress_store::SyncMode::Full,
                (false, Some(days)) => fulfillment_sync_engine::progress_store::SyncMode::DaysWindow(days),
                (false, None) => fulfillment_sync_engine::progress_store::SyncMode::Incremental,
            };
            let outcome = coordinator.sync_entity(entity_kind, mode, cancel).await?;
            info!(entity = %entity_kind, success = outcome.success, items = outcome.items_processed, "sync finished");
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Command::Retry { sync_id } => {
            let outcome = coordinator.retry(&sync_id, cancel).await?;
            info!(sync_id, success = outcome.success, items = outcome.items_processed, "retry finished");
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Command::Status { entity } => {
            let entity_kind = parse_entity(&entity)?;
            match coordinator.status(entity_kind).await {
                Some(status) => println!("{entity_kind}: {status:?}"),
                None => println!("{entity_kind}: no sync has ever run"),
            }
        }
        Command::Count { entity } => {
            let entity_kind = parse_entity(&entity)?;
            let count = coordinator.count(entity_kind).await;
            println!("{entity_kind}: {count}");
        }
    }

    Ok(())
}
