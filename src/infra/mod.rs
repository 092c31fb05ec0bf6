//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults, env overrides)
//! - `metrics` - Lock-free counters with periodic summary logging

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, StoreBackend};
pub use metrics::Metrics;
