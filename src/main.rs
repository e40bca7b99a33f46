//! Ingress sync controller.
//!
//! Reads change notifications from stdin, one per line:
//!
//! ```text
//! default/web www.example.com    upsert rule default/web for host www.example.com
//! -default/web                   delete rule default/web
//! ```
//!
//! Each change is queued by key and reconciled by a single worker that picks
//! the certificate covering the rule's host.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use ingress_sync::config::{load_config, ControllerConfig};
use ingress_sync::controller::{Controller, IngressRule};
use ingress_sync::error::NsNameError;
use ingress_sync::key::{parse_ns_name, Change};
use ingress_sync::lifecycle::{signals, Shutdown};
use ingress_sync::observability::{logging, metrics};

/// Seconds to wait for the worker to drain on shutdown.
const SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "ingress-sync")]
#[command(about = "Ingress controller sync queue", long_about = None)]
struct Cli {
    /// Path to a TOML config file; watched for changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("ingress-sync v0.1.0 starting");

    tracing::info!(
        backoff = ?config.queue.backoff,
        base_delay_ms = config.queue.base_delay_ms,
        max_delay_ms = config.queue.max_delay_ms,
        resync_period_secs = config.queue.resync_period_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let controller = Arc::new(Controller::new(config));

    let worker = {
        let controller = controller.clone();
        let stop = shutdown.subscribe();
        tokio::spawn(async move { controller.run(stop).await })
    };
    {
        let controller = controller.clone();
        let stop = shutdown.subscribe();
        tokio::spawn(async move { controller.run_resync(stop).await });
    }

    // Keep the watcher handle alive for the life of the process.
    let _watcher = match &cli.config {
        Some(path) => Some(controller.watch_config(path)?),
        None => None,
    };

    {
        let controller = controller.clone();
        tokio::spawn(async move { read_changes(&controller).await });
    }

    signals::wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();

    controller
        .shutdown(Duration::from_secs(SHUTDOWN_GRACE_SECS))
        .await;
    let _ = worker.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Feed change notifications from stdin into the controller.
async fn read_changes(controller: &Controller) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_change(&line) {
                Ok(Some(change)) => controller.handle(change),
                Ok(None) => {}
                Err(e) => tracing::warn!(line = %line, error = %e, "Ignoring malformed change"),
            },
            Ok(None) => {
                tracing::debug!("stdin closed, no more changes");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
}

fn parse_change(line: &str) -> Result<Option<Change<IngressRule>>, NsNameError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    if let Some(target) = line.strip_prefix('-') {
        parse_ns_name(target)?;
        return Ok(Some(Change::DeletedFinalStateUnknown {
            key: target.to_string(),
            last_known: None,
        }));
    }

    let mut fields = line.split_whitespace();
    let target = fields.next().unwrap_or_default();
    let host = fields.next().unwrap_or_default();
    let (namespace, name) = parse_ns_name(target)?;
    Ok(Some(Change::Upsert(IngressRule::new(namespace, name, host))))
}
