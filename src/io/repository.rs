//! Read-only query port over the detection log
//!
//! The inference core never talks to a store directly. It sees readings
//! through [`ReadingRepository`], which the MySQL and JSONL adapters implement.

use crate::domain::types::{BayId, Reading, ReadingError};
use async_trait::async_trait;

/// Errors raised by a reading store
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to read store file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid reading: {0}")]
    Reading(#[from] ReadingError),
    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("query timed out after {0} ms")]
    Timeout(u64),
}

/// Ordered queries over one logical table of readings
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Newest readings first, at most `limit` rows
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<Reading>, RepositoryError>;

    /// Readings for `plate` at `bay`, oldest first, at most `limit` rows
    async fn find_by_key(
        &self,
        plate: &str,
        bay: BayId,
        limit: usize,
    ) -> Result<Vec<Reading>, RepositoryError>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}
