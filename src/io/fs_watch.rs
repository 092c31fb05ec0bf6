//! Filesystem change source
//!
//! Watches the storage backing the detection log (the MySQL binlog directory
//! or the JSONL file) and turns every create/modify event into a re-evaluation
//! trigger. Triggers go through a capacity-1 channel with `try_send`, so a
//! burst of filesystem events collapses into one pending evaluation.

use crate::infra::metrics::Metrics;
use anyhow::Context;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Why the monitor should look at the store again
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// One-off scan at startup
    Initial,
    /// A watched path changed
    Changed(PathBuf),
}

/// Channel pair for triggers; at most one trigger waits while an evaluation runs
pub fn trigger_channel() -> (mpsc::Sender<Trigger>, mpsc::Receiver<Trigger>) {
    mpsc::channel(1)
}

/// Push a trigger without blocking, coalescing into any pending one
pub fn offer_trigger(tx: &mpsc::Sender<Trigger>, trigger: Trigger, metrics: &Metrics) {
    match tx.try_send(trigger) {
        Ok(()) => metrics.record_trigger(),
        Err(TrySendError::Full(dropped)) => {
            metrics.record_trigger_coalesced();
            debug!(trigger = ?dropped, "trigger_coalesced");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Whether a filesystem event could mean new rows were written
fn is_write_event(event: &Event) -> bool {
    event.kind.is_create() || event.kind.is_modify()
}

/// Start watching `path`; triggers are sent on `trigger_tx`.
///
/// The returned watcher must be kept alive for as long as events are wanted.
pub fn start_fs_watcher(
    path: &Path,
    recursive: bool,
    trigger_tx: mpsc::Sender<Trigger>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_write_event(&event) => {
            let changed = event.paths.first().cloned().unwrap_or_default();
            offer_trigger(&trigger_tx, Trigger::Changed(changed), &metrics);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "fs_watch_error"),
    })
    .context("Failed to create filesystem watcher")?;

    let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
    watcher
        .watch(path, mode)
        .with_context(|| format!("Failed to watch {}", path.display()))?;

    info!(path = %path.display(), recursive = %recursive, "fs_watch_started");
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, EventKind, ModifyKind};
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_write_events_trigger_and_reads_do_not() {
        let create = Event::new(EventKind::Create(CreateKind::File));
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)));
        let access = Event::new(EventKind::Access(AccessKind::Read));
        assert!(is_write_event(&create));
        assert!(is_write_event(&modify));
        assert!(!is_write_event(&access));
    }

    #[tokio::test]
    async fn test_offer_trigger_coalesces_when_pending() {
        let metrics = Metrics::new();
        let (tx, mut rx) = trigger_channel();

        offer_trigger(&tx, Trigger::Initial, &metrics);
        offer_trigger(&tx, Trigger::Changed(PathBuf::from("a")), &metrics);
        offer_trigger(&tx, Trigger::Changed(PathBuf::from("b")), &metrics);

        assert_eq!(rx.recv().await, Some(Trigger::Initial));
        assert!(rx.try_recv().is_err());

        let summary = metrics.report();
        assert_eq!(summary.triggers, 1);
        assert_eq!(summary.triggers_coalesced, 2);
    }

    #[tokio::test]
    async fn test_watcher_reports_file_writes() {
        let dir = tempdir().unwrap();
        let metrics = Arc::new(Metrics::new());
        let (tx, mut rx) = trigger_channel();

        let _watcher = start_fs_watcher(dir.path(), true, tx, metrics).unwrap();
        std::fs::write(dir.path().join("binlog.000001"), b"row").unwrap();

        let trigger = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(trigger, Some(Trigger::Changed(_))));
    }

    #[test]
    fn test_watch_missing_path_fails() {
        let metrics = Arc::new(Metrics::new());
        let (tx, _rx) = trigger_channel();
        let result = start_fs_watcher(Path::new("/nonexistent/binlog"), true, tx, metrics);
        assert!(result.is_err());
    }
}
