//! Change monitor - re-evaluates the detection log on every trigger
//!
//! One evaluation runs to completion (latest-window fetch, inference and the
//! secondary lookup) before the next trigger is taken. Decided events are
//! handed to the notification worker in order.

use crate::domain::types::OccupancyEvent;
use crate::infra::metrics::Metrics;
use crate::io::fs_watch::Trigger;
use crate::io::repository::{ReadingRepository, RepositoryError};
use crate::services::inferencer::{EventInferencer, InferenceError, RepositoryLookup, WINDOW_SIZE};
use crate::services::notify_worker::NotifySender;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, Instrument};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to fetch latest readings: {0}")]
    Fetch(#[source] RepositoryError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

pub struct ChangeMonitor {
    repository: Arc<dyn ReadingRepository>,
    inferencer: EventInferencer,
    notify: NotifySender,
    metrics: Arc<Metrics>,
    query_timeout: Duration,
}

impl ChangeMonitor {
    pub fn new(
        repository: Arc<dyn ReadingRepository>,
        inferencer: EventInferencer,
        notify: NotifySender,
        metrics: Arc<Metrics>,
        query_timeout: Duration,
    ) -> Self {
        Self { repository, inferencer, notify, metrics, query_timeout }
    }

    /// Consume triggers until the channel closes or shutdown is signalled.
    ///
    /// Shutdown is only checked between evaluations, so an evaluation that
    /// has started always finishes and enqueues its events.
    pub async fn run(
        &self,
        mut trigger_rx: mpsc::Receiver<Trigger>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(backend = %self.repository.backend(), "change_monitor_started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                trigger = trigger_rx.recv() => {
                    let Some(trigger) = trigger else { break };
                    self.handle_trigger(trigger).await;
                }
            }
        }

        info!("change_monitor_stopped");
    }

    /// Evaluate once and enqueue the resulting events; failures are logged
    pub async fn handle_trigger(&self, trigger: Trigger) {
        let eval_id = uuid::Uuid::now_v7();
        let span = info_span!("evaluation", eval_id = %eval_id);

        async {
            match &trigger {
                Trigger::Initial => info!("initial_scan"),
                Trigger::Changed(path) => info!(path = %path.display(), "store_changed"),
            }

            let start = Instant::now();
            match self.check_latest().await {
                Ok(events) => {
                    self.metrics.record_evaluation(start.elapsed().as_micros() as u64);
                    for event in events {
                        self.metrics.record_event(event.kind);
                        self.notify.enqueue(event);
                    }
                }
                Err(e) => {
                    self.metrics.record_evaluation_failure();
                    error!(error = %e, "evaluation_failed");
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fetch the latest window and decide which events it implies
    pub async fn check_latest(&self) -> Result<Vec<OccupancyEvent>, MonitorError> {
        let latest = tokio::time::timeout(self.query_timeout, self.repository.fetch_latest(WINDOW_SIZE))
            .await
            .map_err(|_| MonitorError::Fetch(RepositoryError::Timeout(self.query_timeout.as_millis() as u64)))?
            .map_err(MonitorError::Fetch)?;

        if latest.is_empty() {
            debug!("store_empty");
            return Ok(Vec::new());
        }

        for reading in &latest {
            info!(
                plate = %reading.plate,
                bay = %reading.bay,
                detected_at = %reading.detected_at.to_rfc3339(),
                "reading_observed"
            );
        }

        let lookup = RepositoryLookup::new(self.repository.as_ref(), self.query_timeout);
        let events = self.inferencer.evaluate(&latest, &lookup).await?;

        for event in &events {
            info!(
                event_type = %event.kind.as_str(),
                plate = %event.plate,
                bay = %event.bay,
                timestamp = %event.timestamp_iso(),
                "occupancy_event_emitted"
            );
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BayId, EventKind, Reading};
    use crate::io::fs_watch::trigger_channel;
    use crate::io::notifier::{DeliveryReceipt, NotificationClient, NotifyError};
    use crate::services::notify_worker::{create_notify_worker, NotifyWorker};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    /// In-memory store; rows are kept in insertion order
    struct MemoryRepository {
        rows: Mutex<Vec<Reading>>,
        fail_lookup: bool,
    }

    impl MemoryRepository {
        fn with_rows(rows: Vec<Reading>) -> Self {
            Self { rows: Mutex::new(rows), fail_lookup: false }
        }
    }

    #[async_trait]
    impl ReadingRepository for MemoryRepository {
        async fn fetch_latest(&self, limit: usize) -> Result<Vec<Reading>, RepositoryError> {
            let mut rows = self.rows.lock().unwrap().clone();
            rows.reverse();
            rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
            rows.truncate(limit);
            Ok(rows)
        }

        async fn find_by_key(
            &self,
            plate: &str,
            bay: BayId,
            limit: usize,
        ) -> Result<Vec<Reading>, RepositoryError> {
            if self.fail_lookup {
                return Err(RepositoryError::Io(std::io::Error::other("lost connection")));
            }
            let mut rows: Vec<Reading> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.plate == plate && r.bay == bay)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
            rows.truncate(limit);
            Ok(rows)
        }

        fn backend(&self) -> &'static str {
            "memory"
        }
    }

    struct NullClient;

    #[async_trait]
    impl NotificationClient for NullClient {
        async fn send(&self, _event: &OccupancyEvent) -> Result<DeliveryReceipt, NotifyError> {
            Ok(DeliveryReceipt { status: 200, reason: None, latency_us: 0 })
        }
    }

    fn reading(plate: &str, bay: u32, secs: i64) -> Reading {
        Reading::new(plate, BayId(bay), DateTime::<Utc>::from_timestamp(1_709_258_400 + secs, 0).unwrap())
    }

    fn monitor(repo: MemoryRepository) -> (ChangeMonitor, NotifyWorker, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let (sender, worker) = create_notify_worker(Arc::new(NullClient), metrics.clone(), 16);
        let monitor = ChangeMonitor::new(
            Arc::new(repo),
            EventInferencer::default(),
            sender,
            metrics.clone(),
            Duration::from_secs(1),
        );
        (monitor, worker, metrics)
    }

    #[tokio::test]
    async fn test_empty_store_yields_nothing() {
        let (monitor, _worker, _) = monitor(MemoryRepository::with_rows(vec![]));
        assert!(monitor.check_latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_reading_enters() {
        let (monitor, _worker, _) = monitor(MemoryRepository::with_rows(vec![reading("ABC1", 5, 0)]));
        let events = monitor.check_latest().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Enter);
    }

    #[tokio::test]
    async fn test_repeated_detection_is_debounced_through_repository() {
        let repo = MemoryRepository::with_rows(vec![reading("ABC1", 5, 0), reading("ABC1", 5, 60)]);
        let (monitor, _worker, _) = monitor(repo);
        assert!(monitor.check_latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_counts_as_failed_evaluation() {
        let mut repo = MemoryRepository::with_rows(vec![reading("ABC1", 5, 0), reading("ABC1", 5, 60)]);
        repo.fail_lookup = true;
        let (monitor, _worker, metrics) = monitor(repo);

        assert!(matches!(monitor.check_latest().await, Err(MonitorError::Inference(_))));

        monitor.handle_trigger(Trigger::Initial).await;
        let summary = metrics.report();
        assert_eq!(summary.evaluation_failures, 1);
        assert_eq!(summary.evaluations, 0);
        assert_eq!(summary.total_events, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_counts_events() {
        let repo = MemoryRepository::with_rows(vec![reading("XYZ9", 5, 0), reading("ABC1", 5, 30)]);
        let (monitor, worker, metrics) = monitor(repo);
        let (trigger_tx, trigger_rx) = trigger_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        trigger_tx.send(Trigger::Initial).await.unwrap();
        let worker_handle = tokio::spawn(worker.run());
        let monitor = Arc::new(monitor);
        let runner = monitor.clone();
        let handle = tokio::spawn(async move { runner.run(trigger_rx, shutdown_rx).await });

        // Wait until the queued trigger has been consumed
        for _ in 0..100 {
            if metrics.report().total_events == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        drop(monitor);
        worker_handle.await.unwrap();

        assert_eq!(metrics.report().total_events, 2);
    }
}
