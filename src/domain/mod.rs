//! Domain models - core detection and occupancy types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Reading` - one vehicle detection (plate, bay, time) as read from the store
//! - `RawReading` - a stored record before bay/timestamp normalization
//! - `OccupancyEvent` - an inferred enter/exit transition for a bay
//! - `BayId` - canonical bay identifier

pub mod types;

// Re-export commonly used types at module level
pub use types::{
    BayId, EventKind, OccupancyEvent, RawReading, Reading, ReadingError, StoreTimezone,
    TimestampValue,
};
