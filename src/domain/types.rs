//! Shared types for the occupancy gateway

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Errors raised while normalizing a stored record into a [`Reading`]
#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("timestamp {0} does not exist in the store time zone")]
    NonexistentLocalTime(NaiveDateTime),
    #[error("invalid bay identifier {0:?}")]
    InvalidBay(String),
    #[error("empty license plate")]
    EmptyPlate,
}

/// Canonical bay identifier.
///
/// The detection log stores bay numbers either as integers or as numeric
/// strings; both are normalized to this type at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BayId(pub u32);

impl std::fmt::Display for BayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BayId {
    type Err = ReadingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(BayId).map_err(|_| ReadingError::InvalidBay(s.to_string()))
    }
}

impl TryFrom<i64> for BayId {
    type Error = ReadingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value).map(BayId).map_err(|_| ReadingError::InvalidBay(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for BayId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct BayVisitor;

        impl<'de> Visitor<'de> for BayVisitor {
            type Value = BayId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a bay number as integer or numeric string")
            }

            fn visit_str<E>(self, value: &str) -> Result<BayId, E>
            where
                E: de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<BayId, E>
            where
                E: de::Error,
            {
                u32::try_from(value).map(BayId).map_err(|_| E::custom(format!("bay {} out of range", value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<BayId, E>
            where
                E: de::Error,
            {
                BayId::try_from(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(BayVisitor)
    }
}

/// Time zone used to interpret naive timestamps found in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreTimezone {
    /// Host local time
    #[default]
    Local,
    /// Fixed UTC offset (e.g. `+08:00`)
    Fixed(FixedOffset),
}

impl StoreTimezone {
    /// Resolve a naive store timestamp to an absolute instant
    pub fn to_utc(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>, ReadingError> {
        let resolved = match self {
            StoreTimezone::Local => Local.from_local_datetime(&naive).earliest().map(|t| t.to_utc()),
            StoreTimezone::Fixed(offset) => {
                offset.from_local_datetime(&naive).earliest().map(|t| t.to_utc())
            }
        };
        resolved.ok_or(ReadingError::NonexistentLocalTime(naive))
    }
}

impl std::str::FromStr for StoreTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local" => Ok(StoreTimezone::Local),
            "utc" | "UTC" | "Z" => Ok(StoreTimezone::Fixed(FixedOffset::east_opt(0).ok_or("offset")?)),
            other => {
                // Borrow chrono's offset parser through a full RFC 3339 string
                let probe = format!("2000-01-01T00:00:00{}", other);
                DateTime::parse_from_rfc3339(&probe)
                    .map(|t| StoreTimezone::Fixed(*t.offset()))
                    .map_err(|_| format!("invalid time zone {:?}, expected \"local\" or \"+HH:MM\"", other))
            }
        }
    }
}

impl<'de> Deserialize<'de> for StoreTimezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Timestamp that can be an ISO 8601 string, a naive `YYYY-MM-DD HH:MM:SS`
/// store timestamp, or epoch milliseconds
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampValue {
    Text(String),
    EpochMs(i64),
}

impl TimestampValue {
    const NAIVE_FORMATS: [&'static str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    pub fn resolve(&self, tz: StoreTimezone) -> Result<DateTime<Utc>, ReadingError> {
        match self {
            TimestampValue::EpochMs(ms) => DateTime::<Utc>::from_timestamp_millis(*ms)
                .ok_or_else(|| ReadingError::InvalidTimestamp(ms.to_string())),
            TimestampValue::Text(text) => {
                let text = text.trim();
                if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
                    return Ok(with_offset.to_utc());
                }
                Self::NAIVE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                    .ok_or_else(|| ReadingError::InvalidTimestamp(text.to_string()))
                    .and_then(|naive| tz.to_utc(naive))
            }
        }
    }
}

impl<'de> Deserialize<'de> for TimestampValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = TimestampValue;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or integer timestamp")
            }

            fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::Text(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::Text(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                i64::try_from(value)
                    .map(TimestampValue::EpochMs)
                    .map_err(|_| E::custom(format!("epoch ms {} out of range", value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
            where
                E: de::Error,
            {
                Ok(TimestampValue::EpochMs(value))
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// A stored detection record before normalization
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    pub plate: String,
    pub bay: BayId,
    pub detected_at: TimestampValue,
}

/// One vehicle-detection record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub plate: String,
    pub bay: BayId,
    pub detected_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(plate: impl Into<String>, bay: BayId, detected_at: DateTime<Utc>) -> Self {
        Self { plate: plate.into(), bay, detected_at }
    }

    /// Normalize a raw stored record, resolving naive timestamps in `tz`
    pub fn from_raw(raw: RawReading, tz: StoreTimezone) -> Result<Self, ReadingError> {
        let plate = raw.plate.trim();
        if plate.is_empty() {
            return Err(ReadingError::EmptyPlate);
        }
        let detected_at = raw.detected_at.resolve(tz)?;
        Ok(Self { plate: plate.to_string(), bay: raw.bay, detected_at })
    }
}

/// Kind of inferred occupancy transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Enter,
    Exit,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Enter => "enter",
            EventKind::Exit => "exit",
        }
    }
}

/// Inferred vehicle entering or leaving a bay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyEvent {
    pub kind: EventKind,
    pub plate: String,
    pub bay: BayId,
    pub event_time: DateTime<Utc>,
}

impl OccupancyEvent {
    #[inline]
    pub fn enter(reading: &Reading) -> Self {
        Self::from_reading(EventKind::Enter, reading)
    }

    #[inline]
    pub fn exit(reading: &Reading) -> Self {
        Self::from_reading(EventKind::Exit, reading)
    }

    fn from_reading(kind: EventKind, reading: &Reading) -> Self {
        Self {
            kind,
            plate: reading.plate.clone(),
            bay: reading.bay,
            event_time: reading.detected_at,
        }
    }

    /// ISO 8601 UTC timestamp with millisecond precision (`2024-01-01T08:00:00.000Z`)
    pub fn timestamp_iso(&self) -> String {
        self.event_time.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
