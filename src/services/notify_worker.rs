//! Notification worker - delivers occupancy events off the evaluation path
//!
//! This worker decouples HTTP delivery from the change monitor so a slow or
//! failing endpoint never delays the next evaluation. The monitor enqueues
//! events via an mpsc channel in decision order; the single worker drains it
//! in the same order, so an enter is always sent before the exit it was
//! decided with.

use crate::domain::types::OccupancyEvent;
use crate::infra::metrics::Metrics;
use crate::io::notifier::NotificationClient;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// An event waiting for delivery
#[derive(Debug)]
pub struct QueuedEvent {
    pub event: OccupancyEvent,
    /// When the event was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

impl QueuedEvent {
    pub fn new(event: OccupancyEvent) -> Self {
        Self { event, enqueued_at: Instant::now() }
    }
}

/// Worker that delivers queued events one at a time
pub struct NotifyWorker {
    client: Arc<dyn NotificationClient>,
    event_rx: mpsc::Receiver<QueuedEvent>,
    metrics: Arc<Metrics>,
}

impl NotifyWorker {
    pub fn new(
        client: Arc<dyn NotificationClient>,
        event_rx: mpsc::Receiver<QueuedEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { client, event_rx, metrics }
    }

    /// Run the worker until every sender is dropped and the queue is drained
    pub async fn run(mut self) {
        info!("notify_worker_started");

        while let Some(queued) = self.event_rx.recv().await {
            let queue_delay_us = queued.enqueued_at.elapsed().as_micros() as u64;
            let event = &queued.event;

            match self.client.send(event).await {
                Ok(receipt) => {
                    self.metrics.record_notification_sent();
                    info!(
                        event_type = %event.kind.as_str(),
                        plate = %event.plate,
                        bay = %event.bay,
                        status = %receipt.status,
                        reason = %receipt.reason.as_deref().unwrap_or(""),
                        latency_us = %receipt.latency_us,
                        queue_delay_us = %queue_delay_us,
                        "notification_sent"
                    );
                }
                Err(e) => {
                    self.metrics.record_notification_failed();
                    error!(
                        event_type = %event.kind.as_str(),
                        plate = %event.plate,
                        bay = %event.bay,
                        error = %e,
                        queue_delay_us = %queue_delay_us,
                        "notification_failed"
                    );
                }
            }
        }

        info!("notify_worker_stopped");
    }
}

/// Handle used by the monitor to enqueue events without blocking
#[derive(Clone)]
pub struct NotifySender {
    tx: mpsc::Sender<QueuedEvent>,
    metrics: Arc<Metrics>,
}

impl NotifySender {
    /// Enqueue an event; a full queue drops it with a warning
    pub fn enqueue(&self, event: OccupancyEvent) -> bool {
        match self.tx.try_send(QueuedEvent::new(event)) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_notification_dropped();
                let queued = e.into_inner();
                warn!(
                    event_type = %queued.event.kind.as_str(),
                    plate = %queued.event.plate,
                    bay = %queued.event.bay,
                    "notification_queue_full"
                );
                false
            }
        }
    }
}

/// Create a notification channel and worker
///
/// Returns the sender (for the monitor) and the worker (to be spawned)
pub fn create_notify_worker(
    client: Arc<dyn NotificationClient>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (NotifySender, NotifyWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let worker = NotifyWorker::new(client, rx, metrics.clone());
    (NotifySender { tx, metrics }, worker)
}
