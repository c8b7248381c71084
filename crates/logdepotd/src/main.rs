//! logdepotd - Log Depot Daemon
//!
//! Runs the log collection queue for one server and uploads its logs to
//! the configured depot.
//!
//! Usage:
//!   logdepotd [OPTIONS] <config.toml>
//!
//! Options:
//!   --collect              Request one collection, run it and exit
//!   --context <name>       Depot context; "Zone" selects the zone's depot
//!   --zone                 Same as `--context Zone`
//!   --only-current         Skip rotated logs
//!   --support-case <case>  File the upload under a support case
//!
//! Without `--collect` the daemon serves the queue and requests a
//! collection every `queue.collect_interval_secs`.

mod config;

use std::sync::Arc;

use logdepot_collect::{
    run_scheduled_requests, LogCollector, LogRequest, MemoryDepotStore, MemoryLogFileStore,
    MemoryTaskStore, QueueWorker, Stores, WorkQueue,
};
use logdepot_core::{DepotContext, TaskStatus, TaskStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DaemonConfig;

/// Parsed command-line arguments
struct Args {
    config_path: Option<String>,
    collect: bool,
    context: Option<String>,
    only_current: bool,
    support_case: Option<String>,
}

fn parse_args() -> Args {
    parse_args_from(std::env::args().skip(1).collect())
}

fn parse_args_from(args: Vec<String>) -> Args {
    let mut result = Args {
        config_path: None,
        collect: false,
        context: None,
        only_current: false,
        support_case: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--collect" | "-c" => result.collect = true,
            "--zone" => result.context = Some("Zone".to_string()),
            "--context" => {
                if i + 1 < args.len() {
                    result.context = Some(args[i + 1].clone());
                    i += 1;
                } else {
                    tracing::error!("Missing argument for --context");
                }
            }
            "--only-current" => result.only_current = true,
            "--support-case" => {
                if i + 1 < args.len() {
                    result.support_case = Some(args[i + 1].clone());
                    i += 1;
                } else {
                    tracing::error!("Missing argument for --support-case");
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => result.config_path = Some(arg.to_string()),
            _ => tracing::warn!("Unknown argument: {}", args[i]),
        }
        i += 1;
    }

    result
}

fn print_help() {
    eprintln!(
        r#"logdepotd - Log Depot Daemon

Usage: logdepotd [OPTIONS] <config.toml>

Options:
  -c, --collect              Request one log collection, run it and exit
      --context <name>       Depot context; "Zone" uploads to the zone depot
      --zone                 Same as --context Zone
      --only-current         Collect only the live logs
      --support-case <case>  File the upload under a support case
  -h, --help                 Print this help message

Examples:
  # Serve the collection queue and collect on the configured interval
  logdepotd logdepot.toml

  # Collect now into the zone depot for a support case
  logdepotd --collect --zone --support-case CASE-1234 logdepot.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logdepotd=info,logdepot_collect=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = parse_args();
    let Some(ref path) = args.config_path else {
        print_help();
        anyhow::bail!("No config file provided");
    };

    // Load configuration
    tracing::info!("Loading config from: {}", path);
    let config = DaemonConfig::load(path)?;
    let server = config.identity();
    tracing::info!(
        guid = %server.guid,
        zone = %server.zone.name,
        "Starting logdepotd for {}",
        server.who_am_i()
    );

    // Build stores, queue and collector
    let queue = Arc::new(WorkQueue::new());
    let stores = Stores {
        log_files: Arc::new(MemoryLogFileStore::new()),
        tasks: Arc::new(MemoryTaskStore::new()),
        depots: Arc::new(MemoryDepotStore::from_configs(&config.depots)),
    };
    let collector = Arc::new(LogCollector::new(
        server,
        config.collection.clone(),
        stores,
        queue.clone(),
    ));
    let worker = QueueWorker::new(queue, collector.clone());

    // Clear collections interrupted by the last shutdown before any new
    // request is queued
    collector.queue_startup_cleanup();
    worker.drain().await;

    let request = LogRequest {
        context: DepotContext::from_context(args.context.as_deref()),
        only_current: args.only_current,
        support_case: args.support_case.clone(),
    };

    // One-shot collection
    if args.collect {
        let (task_id, _) = collector.request_log_collection(request).await?;
        worker.drain().await;

        let task = collector.tasks().get(task_id).await?;
        tracing::info!(task_id, state = %task.state, status = %task.status, "{}", task.message);
        if task.status != TaskStatus::Ok {
            anyhow::bail!("Log collection failed: {}", task.message);
        }
        return Ok(());
    }

    // Serve until Ctrl-C
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let scheduler = match config.queue.collect_interval() {
        Some(interval) => {
            tracing::info!(interval_secs = interval.as_secs(), "Scheduling log collections");
            Some(tokio::spawn(run_scheduled_requests(
                collector.clone(),
                interval,
                request,
                shutdown_rx.clone(),
            )))
        }
        None => {
            tracing::info!("Scheduled log collection disabled");
            None
        }
    };

    worker.run(config.queue.poll_interval(), shutdown_rx).await;
    if let Some(scheduler) = scheduler {
        scheduler.await?;
    }
    Ok(())
}
