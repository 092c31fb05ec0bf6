//! Services - occupancy inference and orchestration
//!
//! This module contains the core business logic services:
//! - `inferencer` - Stateless enter/exit decision over the latest readings
//! - `monitor` - Re-evaluates the store on every change trigger
//! - `notify_worker` - Ordered, non-blocking delivery of decided events

pub mod inferencer;
pub mod monitor;
pub mod notify_worker;

// Re-export commonly used types
pub use inferencer::{EventInferencer, InferenceError, RepositoryLookup, SecondaryLookup};
pub use monitor::{ChangeMonitor, MonitorError};
pub use notify_worker::{create_notify_worker, NotifySender, NotifyWorker, QueuedEvent};
