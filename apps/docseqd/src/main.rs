//! # docseqd
//!
//! Opens the ledger database and runs the reclaim worker until shut down.
//!
//! ## Usage
//! ```text
//! docseqd [--config PATH] [--once]
//!
//!   --config PATH   engine config file (default: platform config dir)
//!   --once          fire due reclaim tasks once and exit
//! ```
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=docseq=trace` - Show trace for docseq crates only
//! - Default: `info,docseq=debug,sqlx=warn`

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docseq_db::Database;
use docseq_engine::{EngineConfig, ReclaimWorker, SystemClock};

struct Args {
    config: Option<PathBuf>,
    once: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        once: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--once" => args.once = true,
            "--help" | "-h" => {
                println!("Usage: docseqd [--config PATH] [--once]");
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = parse_args()?;
    info!("Starting docseqd...");

    let config = EngineConfig::load(args.config)?;
    info!(
        db_path = %config.database.path.display(),
        reservation_ttl_secs = config.reservation.ttl_secs,
        reclaimer_enabled = config.reclaimer.enabled,
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::new(config.db_config()).await?;
    let migrations = db.migration_status().await?;
    info!(
        applied = migrations.applied,
        total = migrations.total,
        "Database ready"
    );

    if !db.health_check().await {
        error!("Database health check failed");
        return Err("database health check failed".into());
    }

    let queue = db.reclaim_tasks();
    match queue.next_due().await? {
        Some(next_due) => info!(pending = queue.count().await?, %next_due, "Reclaim queue loaded"),
        None => info!("Reclaim queue empty"),
    }

    let (worker, handle) = ReclaimWorker::new(db.clone(), Arc::new(SystemClock), config.reclaimer.clone());

    if args.once {
        let stats = worker.run_once().await?;
        info!(
            reclaimed = stats.reclaimed,
            rearmed = stats.rearmed,
            dropped = stats.dropped,
            failed = stats.failed,
            "Single reclaim pass complete"
        );
        db.close().await;
        return Ok(());
    }

    if !config.reclaimer.enabled {
        warn!("Reclaimer disabled by configuration; nothing to do");
        db.close().await;
        return Ok(());
    }

    let worker_task = tokio::spawn(worker.run());

    shutdown_signal().await;

    if let Err(e) = handle.shutdown().await {
        warn!(?e, "Reclaim worker already stopped");
    }
    if let Err(e) = worker_task.await {
        error!(?e, "Reclaim worker panicked");
    }

    db.close().await;
    info!("docseqd shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,docseq=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping reclaim worker...");
}
