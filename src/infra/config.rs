//! Configuration loading from TOML files
//!
//! The file path comes from `--config`, then `CONFIG_FILE`, then
//! `config/dev.toml` (resolved by the binary's argument parser).
//!
//! Secrets can be supplied through the environment instead of the file:
//! `GATEWAY_DATABASE_URL`, `GATEWAY_ACCESS_TOKEN`, `GATEWAY_STATION_ID`.

use crate::domain::types::StoreTimezone;
use crate::io::mysql_store::SqlSchema;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mysql,
    Jsonl,
}

impl StoreBackend {
    pub fn as_str(&self) -> &str {
        match self {
            StoreBackend::Mysql => "mysql",
            StoreBackend::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Station identifier reported with every event
    #[serde(default = "default_station_id")]
    pub station_id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { station_id: default_station_id() }
    }
}

fn default_station_id() -> String {
    "station".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Directory or file whose changes trigger a re-evaluation
    pub path: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Evaluate once at startup before waiting for changes
    #[serde(default = "default_true")]
    pub initial_scan: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_plate_column")]
    pub plate_column: String,
    #[serde(default = "default_bay_column")]
    pub bay_column: String,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// JSONL log file (jsonl backend only)
    #[serde(default)]
    pub jsonl_path: Option<String>,
    /// Zone for naive timestamps: "local" or "+HH:MM"
    #[serde(default)]
    pub timezone: StoreTimezone,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_table() -> String {
    "data".to_string()
}

fn default_plate_column() -> String {
    "HPHM".to_string()
}

fn default_bay_column() -> String {
    "CDBH".to_string()
}

fn default_timestamp_column() -> String {
    "JGSJ".to_string()
}

fn default_max_connections() -> u32 {
    2
}

fn default_query_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    pub base_url: String,
    #[serde(default = "default_events_path")]
    pub events_path: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
    /// Capacity of the outbound event queue
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_events_path() -> String {
    "/api/cameras/license-plate-events".to_string()
}

fn default_notify_timeout_ms() -> u64 {
    5000
}

fn default_queue_size() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Repeat detections of a vehicle at a bay within this window are continuations
    #[serde(default = "default_debounce_window_secs")]
    pub debounce_window_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { debounce_window_secs: default_debounce_window_secs() }
    }
}

fn default_debounce_window_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub watch: WatchConfig,
    pub store: StoreConfig,
    pub notify: NotifyConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    station_id: String,
    watch_path: String,
    watch_recursive: bool,
    initial_scan: bool,
    store_backend: StoreBackend,
    database_url: Option<String>,
    sql_schema: SqlSchema,
    max_connections: u32,
    jsonl_path: Option<String>,
    store_timezone: StoreTimezone,
    query_timeout_ms: u64,
    notify_base_url: String,
    notify_events_path: String,
    notify_access_token: Option<String>,
    notify_timeout_ms: u64,
    notify_queue_size: usize,
    debounce_window_secs: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station_id: default_station_id(),
            watch_path: "readings.jsonl".to_string(),
            watch_recursive: true,
            initial_scan: true,
            store_backend: StoreBackend::Jsonl,
            database_url: None,
            sql_schema: SqlSchema::default(),
            max_connections: default_max_connections(),
            jsonl_path: Some("readings.jsonl".to_string()),
            store_timezone: StoreTimezone::Local,
            query_timeout_ms: default_query_timeout_ms(),
            notify_base_url: "http://localhost:8080".to_string(),
            notify_events_path: default_events_path(),
            notify_access_token: None,
            notify_timeout_ms: default_notify_timeout_ms(),
            notify_queue_size: default_queue_size(),
            debounce_window_secs: default_debounce_window_secs(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let store = toml_config.store;
        Ok(Self {
            station_id: toml_config.site.station_id,
            watch_path: toml_config.watch.path,
            watch_recursive: toml_config.watch.recursive,
            initial_scan: toml_config.watch.initial_scan,
            store_backend: store.backend,
            database_url: store.database_url,
            sql_schema: SqlSchema {
                table: store.table,
                plate_column: store.plate_column,
                bay_column: store.bay_column,
                timestamp_column: store.timestamp_column,
            },
            max_connections: store.max_connections,
            jsonl_path: store.jsonl_path,
            store_timezone: store.timezone,
            query_timeout_ms: store.query_timeout_ms,
            notify_base_url: toml_config.notify.base_url,
            notify_events_path: toml_config.notify.events_path,
            notify_access_token: toml_config.notify.access_token,
            notify_timeout_ms: toml_config.notify.timeout_ms,
            notify_queue_size: toml_config.notify.queue_size,
            debounce_window_secs: toml_config.inference.debounce_window_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults.
    /// Environment overrides are applied either way.
    pub fn load_from_path(path: &str) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        };
        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply secret overrides from an environment lookup
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GATEWAY_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(token) = lookup("GATEWAY_ACCESS_TOKEN") {
            self.notify_access_token = Some(token);
        }
        if let Some(station) = lookup("GATEWAY_STATION_ID") {
            self.station_id = station;
        }
        self
    }

    /// Check that the selected backend has what it needs
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.store_backend {
            StoreBackend::Mysql if self.database_url.is_none() => {
                anyhow::bail!("store.database_url (or GATEWAY_DATABASE_URL) is required for the mysql backend")
            }
            StoreBackend::Jsonl if self.jsonl_path.is_none() => {
                anyhow::bail!("store.jsonl_path is required for the jsonl backend")
            }
            _ => {}
        }
        if self.notify_queue_size == 0 {
            anyhow::bail!("notify.queue_size must be at least 1");
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn watch_path(&self) -> &str {
        &self.watch_path
    }

    pub fn watch_recursive(&self) -> bool {
        self.watch_recursive
    }

    pub fn initial_scan(&self) -> bool {
        self.initial_scan
    }

    pub fn store_backend(&self) -> StoreBackend {
        self.store_backend
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn sql_schema(&self) -> &SqlSchema {
        &self.sql_schema
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn jsonl_path(&self) -> Option<&str> {
        self.jsonl_path.as_deref()
    }

    pub fn store_timezone(&self) -> StoreTimezone {
        self.store_timezone
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn notify_base_url(&self) -> &str {
        &self.notify_base_url
    }

    pub fn notify_events_path(&self) -> &str {
        &self.notify_events_path
    }

    pub fn notify_access_token(&self) -> Option<&str> {
        self.notify_access_token.as_deref()
    }

    pub fn notify_timeout_ms(&self) -> u64 {
        self.notify_timeout_ms
    }

    pub fn notify_queue_size(&self) -> usize {
        self.notify_queue_size
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_window_secs)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the notifier elsewhere
    #[cfg(test)]
    pub fn with_notify_base_url(mut self, url: &str) -> Self {
        self.notify_base_url = url.to_string();
        self
    }
}
