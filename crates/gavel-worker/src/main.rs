//! Gavel judge worker
//!
//! A daemon that consumes code submissions from the broker, grades each one
//! inside an isolate sandbox, and delivers the verdict back through a reply
//! queue or a signed webhook.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

use gavel::{Config, Judge, SlotPool, prepare_cgroup};

mod publish;
mod queue;
mod store;
mod worker;

use crate::publish::Publisher;
use crate::queue::JobQueue;
use crate::store::WorkerStore;

/// How long busy workers get to finish their current job after a shutdown
/// signal before the process exits regardless
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "gavel-worker")]
#[command(about = "Queue-consuming judge worker for grading code submissions")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent grading workers
    #[arg(short, long, default_value_t = 5)]
    workers: u32,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    let mut config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    // Set up cgroup hierarchy if cgroup mode is enabled
    if config.cgroup {
        match prepare_cgroup(&config.cg_root) {
            Ok(true) => debug!("cgroup hierarchy ready"),
            Ok(false) => {
                warn!(
                    "cgroup support unavailable (memory controller not found), falling back to RLIMIT_AS"
                );
                config.cgroup = false;
            }
            Err(e) => {
                warn!("cgroup setup failed: {e}, falling back to RLIMIT_AS memory limiting");
                config.cgroup = false;
            }
        }
    }

    // Mandatory broker connection; failure here exits non-zero
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url.as_str()).context("invalid REDIS_URL")?;
    let conn = redis::aio::ConnectionManager::new(client.clone())
        .await
        .context("failed to connect to broker")?;
    info!(%redis_url, "connected to broker");

    let webhook_secret = std::env::var("GAVEL_WEBHOOK_SECRET").ok();
    if webhook_secret.is_none() {
        warn!("GAVEL_WEBHOOK_SECRET not set; webhook deliveries will fail");
    }

    let config = Arc::new(config);

    // One sandbox slot per worker: slot allocation is what guarantees no two
    // concurrent jobs share a box
    let pool = Arc::new(SlotPool::new(
        0,
        cli.workers,
        config.isolate_binary(),
        config.cgroup,
    ));
    let store = WorkerStore::new(Arc::clone(&config), conn.clone());
    let judge = Arc::new(Judge::new(Arc::clone(&config), pool, store));
    let publisher = Publisher::new(conn, webhook_secret);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        workers = cli.workers,
        languages = config.languages.len(),
        "starting workers; waiting for submissions"
    );

    let mut workers = JoinSet::new();
    for worker_id in 0..cli.workers as usize {
        // Each worker gets its own broker connection for the queue wait:
        // BLMOVE parks its connection server-side, so sharing the multiplexed
        // connection would stall every other worker's commands
        let queue_conn = redis::aio::ConnectionManager::new(client.clone())
            .await
            .context("failed to open worker queue connection")?;
        let job_queue = JobQueue::new(queue_conn, &config.queue);

        workers.spawn(worker::run(
            worker_id,
            Arc::clone(&judge),
            job_queue,
            publisher.clone(),
            shutdown_rx.clone(),
        ));
    }

    signal::ctrl_c()
        .await
        .context("failed to install shutdown signal handler")?;
    warn!("shutdown signal received; draining workers");
    let _ = shutdown_tx.send(true);

    let drain = async {
        while workers.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "grace period elapsed with workers still busy; forcing shutdown"
        );
    }

    info!("worker shutdown complete");
    Ok(())
}
