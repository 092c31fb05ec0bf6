//! Occupancy event inference
//!
//! Decides which enter/exit events follow from the two most recent readings
//! in the detection log. Rules, in order:
//!
//! - one reading: the vehicle entered its bay
//! - two readings at different bays: debounce check on the newest
//! - two readings at one bay, different plates: newest entered, previous exited
//! - two readings at one bay, same plate: debounce check on the newest
//!
//! The debounce check looks up the first two readings of the vehicle at that
//! bay (oldest first). With fewer than two there is no earlier stay, so the
//! vehicle entered. Otherwise it entered only if more than the debounce window
//! has passed since the first of them; within the window it is still parked.
//!
//! The inferencer keeps no state. Every decision is a function of the window
//! and whatever the lookup returns.

use crate::domain::types::{BayId, OccupancyEvent, Reading};
use crate::io::repository::{ReadingRepository, RepositoryError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Readings per evaluation window
pub const WINDOW_SIZE: usize = 2;

/// Rows requested from the secondary lookup
pub const LOOKUP_LIMIT: usize = 2;

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("evaluation window holds {0} readings, at most 2 allowed")]
    WindowTooLarge(usize),
    #[error("evaluation window is not newest-first")]
    WindowOutOfOrder,
    #[error("prior-reading lookup failed for {plate} at bay {bay}: {source}")]
    Lookup {
        plate: String,
        bay: BayId,
        #[source]
        source: RepositoryError,
    },
}

/// Prior readings of a vehicle at a bay, oldest first, at most [`LOOKUP_LIMIT`]
#[async_trait]
pub trait SecondaryLookup: Send + Sync {
    async fn prior_readings(&self, plate: &str, bay: BayId) -> Result<Vec<Reading>, RepositoryError>;
}

/// Secondary lookup backed by a repository, bounded by a query timeout
pub struct RepositoryLookup<'a> {
    repository: &'a dyn ReadingRepository,
    timeout: Duration,
}

impl<'a> RepositoryLookup<'a> {
    pub fn new(repository: &'a dyn ReadingRepository, timeout: Duration) -> Self {
        Self { repository, timeout }
    }
}

#[async_trait]
impl SecondaryLookup for RepositoryLookup<'_> {
    async fn prior_readings(&self, plate: &str, bay: BayId) -> Result<Vec<Reading>, RepositoryError> {
        tokio::time::timeout(self.timeout, self.repository.find_by_key(plate, bay, LOOKUP_LIMIT))
            .await
            .map_err(|_| RepositoryError::Timeout(self.timeout.as_millis() as u64))?
    }
}

#[derive(Debug, Clone)]
pub struct EventInferencer {
    debounce_window_secs: i64,
}

impl Default for EventInferencer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl EventInferencer {
    pub fn new(debounce_window: Duration) -> Self {
        let debounce_window_secs = i64::try_from(debounce_window.as_secs()).unwrap_or(i64::MAX);
        Self { debounce_window_secs }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_window_secs as u64)
    }

    /// Evaluate a newest-first window of at most two readings.
    ///
    /// Returns events in emission order (enter before exit). Any lookup
    /// failure aborts the evaluation; no partial list is ever returned.
    pub async fn evaluate<L>(
        &self,
        latest: &[Reading],
        lookup: &L,
    ) -> Result<Vec<OccupancyEvent>, InferenceError>
    where
        L: SecondaryLookup + ?Sized,
    {
        match latest {
            [] => Ok(Vec::new()),
            [only] => {
                info!(plate = %only.plate, bay = %only.bay, "no_previous_vehicle_at_bay");
                Ok(vec![OccupancyEvent::enter(only)])
            }
            [newest, previous] => {
                if newest.detected_at < previous.detected_at {
                    return Err(InferenceError::WindowOutOfOrder);
                }

                if newest.bay != previous.bay {
                    debug!(
                        bay = %newest.bay,
                        previous_bay = %previous.bay,
                        "bay_changed"
                    );
                    self.check_prior_stay(newest, lookup).await
                } else if newest.plate != previous.plate {
                    info!(
                        bay = %newest.bay,
                        plate = %newest.plate,
                        previous_plate = %previous.plate,
                        "bay_occupant_changed"
                    );
                    Ok(vec![OccupancyEvent::enter(newest), OccupancyEvent::exit(previous)])
                } else {
                    self.check_prior_stay(newest, lookup).await
                }
            }
            _ => Err(InferenceError::WindowTooLarge(latest.len())),
        }
    }

    /// Debounce check for `current` against its earliest readings at the bay
    async fn check_prior_stay<L>(
        &self,
        current: &Reading,
        lookup: &L,
    ) -> Result<Vec<OccupancyEvent>, InferenceError>
    where
        L: SecondaryLookup + ?Sized,
    {
        let prior = lookup.prior_readings(&current.plate, current.bay).await.map_err(|source| {
            InferenceError::Lookup { plate: current.plate.clone(), bay: current.bay, source }
        })?;

        // A single row is the current reading itself: no earlier stay to compare
        let [first, _, ..] = prior.as_slice() else {
            info!(
                plate = %current.plate,
                bay = %current.bay,
                rows = prior.len(),
                "no_prior_stay_at_bay"
            );
            return Ok(vec![OccupancyEvent::enter(current)]);
        };

        let elapsed_secs = elapsed_secs_rounded(first, current);
        if elapsed_secs > self.debounce_window_secs {
            info!(
                plate = %current.plate,
                bay = %current.bay,
                elapsed_secs = %elapsed_secs,
                "debounce_window_expired"
            );
            Ok(vec![OccupancyEvent::enter(current)])
        } else {
            info!(
                plate = %current.plate,
                bay = %current.bay,
                elapsed_secs = %elapsed_secs,
                window_secs = %self.debounce_window_secs,
                "vehicle_within_debounce_window"
            );
            Ok(Vec::new())
        }
    }
}

/// Seconds from `earlier` to `later`, rounded half up to the nearest second
fn elapsed_secs_rounded(earlier: &Reading, later: &Reading) -> i64 {
    let elapsed_ms = (later.detected_at - earlier.detected_at).num_milliseconds();
    (elapsed_ms + 500).div_euclid(1000)
}
