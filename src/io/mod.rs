//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `repository` - Read-only query port over the detection log
//! - `mysql_store` - MySQL detection log (sqlx)
//! - `jsonl_store` - Append-only JSONL detection log
//! - `notifier` - HTTP delivery of occupancy events
//! - `fs_watch` - Filesystem change source for re-evaluation triggers

pub mod fs_watch;
pub mod jsonl_store;
pub mod mysql_store;
pub mod notifier;
pub mod repository;

// Re-export commonly used types
pub use fs_watch::{start_fs_watcher, trigger_channel, Trigger};
pub use jsonl_store::JsonlReadingRepository;
pub use mysql_store::{SqlReadingRepository, SqlSchema};
pub use notifier::{DeliveryReceipt, HttpNotifier, NotificationClient, NotifyError};
pub use repository::{ReadingRepository, RepositoryError};
