//! Lock-free counters and periodic reporting
//!
//! All counter updates are single atomic adds on the hot path. Reporting
//! swaps the interval counters to zero and keeps lifetime totals.
//!
//! Counters use Relaxed ordering; they are statistics only and must not be
//! used for coordination.

use crate::domain::types::EventKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

pub struct Metrics {
    triggers: AtomicU64,
    triggers_coalesced: AtomicU64,
    evaluations: AtomicU64,
    evaluation_failures: AtomicU64,
    eval_latency_sum_us: AtomicU64,
    eval_latency_max_us: AtomicU64,
    enter_events: AtomicU64,
    exit_events: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    notifications_dropped: AtomicU64,
    // Lifetime totals (never reset)
    total_evaluations: AtomicU64,
    total_events: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            triggers: AtomicU64::new(0),
            triggers_coalesced: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            evaluation_failures: AtomicU64::new(0),
            eval_latency_sum_us: AtomicU64::new(0),
            eval_latency_max_us: AtomicU64::new(0),
            enter_events: AtomicU64::new(0),
            exit_events: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            total_evaluations: AtomicU64::new(0),
            total_events: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_trigger_coalesced(&self) {
        self.triggers_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed evaluation and its latency
    #[inline]
    pub fn record_evaluation(&self, latency_us: u64) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.total_evaluations.fetch_add(1, Ordering::Relaxed);
        self.eval_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.eval_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_evaluation_failure(&self) {
        self.evaluation_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event(&self, kind: EventKind) {
        match kind {
            EventKind::Enter => self.enter_events.fetch_add(1, Ordering::Relaxed),
            EventKind::Exit => self.exit_events.fetch_add(1, Ordering::Relaxed),
        };
        self.total_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Swap interval counters to zero and return a summary
    pub fn report(&self) -> MetricsSummary {
        let evaluations = self.evaluations.swap(0, Ordering::Relaxed);
        let latency_sum = self.eval_latency_sum_us.swap(0, Ordering::Relaxed);
        let avg_eval_latency_us = if evaluations > 0 { latency_sum / evaluations } else { 0 };

        MetricsSummary {
            triggers: self.triggers.swap(0, Ordering::Relaxed),
            triggers_coalesced: self.triggers_coalesced.swap(0, Ordering::Relaxed),
            evaluations,
            evaluation_failures: self.evaluation_failures.swap(0, Ordering::Relaxed),
            avg_eval_latency_us,
            max_eval_latency_us: self.eval_latency_max_us.swap(0, Ordering::Relaxed),
            enter_events: self.enter_events.swap(0, Ordering::Relaxed),
            exit_events: self.exit_events.swap(0, Ordering::Relaxed),
            notifications_sent: self.notifications_sent.swap(0, Ordering::Relaxed),
            notifications_failed: self.notifications_failed.swap(0, Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.swap(0, Ordering::Relaxed),
            total_evaluations: self.total_evaluations.load(Ordering::Relaxed),
            total_events: self.total_events.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Snapshot of one reporting interval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub triggers: u64,
    pub triggers_coalesced: u64,
    pub evaluations: u64,
    pub evaluation_failures: u64,
    pub avg_eval_latency_us: u64,
    pub max_eval_latency_us: u64,
    pub enter_events: u64,
    pub exit_events: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub notifications_dropped: u64,
    pub total_evaluations: u64,
    pub total_events: u64,
    pub uptime_secs: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            triggers = %self.triggers,
            triggers_coalesced = %self.triggers_coalesced,
            evaluations = %self.evaluations,
            evaluation_failures = %self.evaluation_failures,
            avg_eval_latency_us = %self.avg_eval_latency_us,
            max_eval_latency_us = %self.max_eval_latency_us,
            enter_events = %self.enter_events,
            exit_events = %self.exit_events,
            notifications_sent = %self.notifications_sent,
            notifications_failed = %self.notifications_failed,
            notifications_dropped = %self.notifications_dropped,
            total_evaluations = %self.total_evaluations,
            total_events = %self.total_events,
            uptime_secs = %self.uptime_secs,
            "metrics_summary"
        );
    }
}
