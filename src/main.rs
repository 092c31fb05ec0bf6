//! Occupancy gateway - turns ANPR bay detections into enter/exit events
//!
//! Watches the storage behind the detection log, re-reads the two newest
//! readings on every change and forwards the inferred occupancy events to the
//! status-tracking service.
//!
//! Module structure:
//! - `domain/` - Core types (Reading, OccupancyEvent, BayId)
//! - `io/` - External interfaces (MySQL / JSONL stores, HTTP notifier, fs watcher)
//! - `services/` - Business logic (EventInferencer, ChangeMonitor, NotifyWorker)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use occupancy_gateway::infra::{Config, Metrics, StoreBackend};
use occupancy_gateway::io::fs_watch::{offer_trigger, start_fs_watcher, trigger_channel, Trigger};
use occupancy_gateway::io::{
    HttpNotifier, JsonlReadingRepository, NotificationClient, ReadingRepository,
    SqlReadingRepository,
};
use occupancy_gateway::services::{create_notify_worker, ChangeMonitor, EventInferencer};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Occupancy gateway - bay enter/exit inference from ANPR detections
#[derive(Parser, Debug)]
#[command(name = "occupancy-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

fn build_repository(config: &Config) -> anyhow::Result<Arc<dyn ReadingRepository>> {
    match config.store_backend() {
        StoreBackend::Mysql => {
            let url = config.database_url().context("store.database_url is not set")?;
            let repo = SqlReadingRepository::connect_lazy(
                url,
                config.max_connections(),
                config.sql_schema(),
                config.store_timezone(),
            )
            .context("Failed to initialize MySQL store")?;
            Ok(Arc::new(repo))
        }
        StoreBackend::Jsonl => {
            let path = config.jsonl_path().context("store.jsonl_path is not set")?;
            Ok(Arc::new(JsonlReadingRepository::new(path, config.store_timezone())))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-query visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "occupancy-gateway starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    config.validate()?;

    info!(
        config_file = %config.config_file(),
        station_id = %config.station_id(),
        watch_path = %config.watch_path(),
        store_backend = %config.store_backend().as_str(),
        notify_url = %config.notify_base_url(),
        debounce_window_secs = %config.debounce_window().as_secs(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let repository = build_repository(&config)?;
    let notifier: Arc<dyn NotificationClient> =
        Arc::new(HttpNotifier::new(&config).context("Failed to create HTTP notifier")?);

    // Notification worker owns delivery; the monitor only enqueues
    let (notify_sender, notify_worker) =
        create_notify_worker(notifier, metrics.clone(), config.notify_queue_size());
    let worker_handle = tokio::spawn(notify_worker.run());

    let (trigger_tx, trigger_rx) = trigger_channel();
    let _watcher = start_fs_watcher(
        Path::new(config.watch_path()),
        config.watch_recursive(),
        trigger_tx.clone(),
        metrics.clone(),
    )?;

    if config.initial_scan() {
        offer_trigger(&trigger_tx, Trigger::Initial, &metrics);
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let monitor = ChangeMonitor::new(
        repository,
        EventInferencer::new(config.debounce_window()),
        notify_sender,
        metrics.clone(),
        config.query_timeout(),
    );

    // Runs until shutdown; an in-flight evaluation completes first
    monitor.run(trigger_rx, shutdown_rx).await;

    // Dropping the monitor closes the queue so the worker drains and exits
    drop(monitor);
    drop(trigger_tx);
    worker_handle.await.ok();

    metrics.report().log();
    info!("occupancy-gateway shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_from_flag() {
        let args = Args::try_parse_from(["occupancy-gateway", "--config", "config/mysql.toml"]).unwrap();
        assert_eq!(args.config, "config/mysql.toml");
    }

    #[test]
    fn test_config_path_default() {
        if std::env::var("CONFIG_FILE").is_err() {
            let args = Args::try_parse_from(["occupancy-gateway"]).unwrap();
            assert_eq!(args.config, "config/dev.toml");
        }
    }
}
