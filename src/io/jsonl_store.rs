//! Append-only JSONL detection log
//!
//! Each line is one `RawReading`:
//! `{"plate":"WXY1234","bay":3,"detected_at":"2024-03-01 10:00:00"}`
//!
//! The file is the store: every query re-reads it, nothing is cached.

use crate::domain::types::{BayId, RawReading, Reading, StoreTimezone};
use crate::io::repository::{ReadingRepository, RepositoryError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// One non-blank line of the log, decoded or not
struct LogLine {
    number: usize,
    decoded: Result<Reading, RepositoryError>,
}

pub struct JsonlReadingRepository {
    path: PathBuf,
    timezone: StoreTimezone,
    skipped_lines: AtomicU64,
}

impl JsonlReadingRepository {
    pub fn new(path: impl Into<PathBuf>, timezone: StoreTimezone) -> Self {
        Self { path: path.into(), timezone, skipped_lines: AtomicU64::new(0) }
    }

    /// Malformed lines passed over so far (counted once per query that skipped them)
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines.load(Ordering::Relaxed)
    }

    /// Read every non-blank line in write order
    async fn load(&self) -> Result<Vec<LogLine>, RepositoryError> {
        let content = tokio::fs::read_to_string(&self.path).await?;

        let lines: Vec<LogLine> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| LogLine { number: idx + 1, decoded: self.decode_line(idx + 1, line) })
            .collect();

        debug!(path = %self.path.display(), rows = lines.len(), "jsonl_store_loaded");
        Ok(lines)
    }

    fn decode_line(&self, number: usize, line: &str) -> Result<Reading, RepositoryError> {
        let raw: RawReading = serde_json::from_str(line.trim())
            .map_err(|source| RepositoryError::Decode { line: number, source })?;
        Ok(Reading::from_raw(raw, self.timezone)?)
    }

    /// Keep the decoded readings.
    ///
    /// A malformed line among the last `newest` lines written fails the query;
    /// older ones are skipped with a warning.
    fn usable(&self, lines: Vec<LogLine>, newest: usize) -> Result<Vec<Reading>, RepositoryError> {
        let total = lines.len();
        let mut readings = Vec::with_capacity(total);

        for (pos, line) in lines.into_iter().enumerate() {
            match line.decoded {
                Ok(reading) => readings.push(reading),
                Err(e) if pos + newest >= total => return Err(e),
                Err(e) => {
                    self.skipped_lines.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        path = %self.path.display(),
                        line = %line.number,
                        error = %e,
                        "jsonl_line_skipped"
                    );
                }
            }
        }

        Ok(readings)
    }
}

#[async_trait]
impl ReadingRepository for JsonlReadingRepository {
    async fn fetch_latest(&self, limit: usize) -> Result<Vec<Reading>, RepositoryError> {
        let mut readings = self.usable(self.load().await?, limit)?;
        // Reverse first so the stable sort keeps the last-written row ahead on ties
        readings.reverse();
        readings.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        readings.truncate(limit);
        Ok(readings)
    }

    /// Malformed lines cannot be attributed to a key and are skipped
    async fn find_by_key(
        &self,
        plate: &str,
        bay: BayId,
        limit: usize,
    ) -> Result<Vec<Reading>, RepositoryError> {
        let mut readings: Vec<Reading> = self
            .usable(self.load().await?, 0)?
            .into_iter()
            .filter(|r| r.plate == plate && r.bay == bay)
            .collect();
        readings.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
        readings.truncate(limit);
        Ok(readings)
    }

    fn backend(&self) -> &'static str {
        "jsonl"
    }
}
