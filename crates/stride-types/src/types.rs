//! Core types for step data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::day::{format_day, parse_day};
use crate::error::{ParseError, ParseResult};

/// The accumulated step count attributed to one calendar day.
///
/// The local store holds at most one record per `date`, and within a day
/// `count` only ever grows once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepRecord {
    /// Calendar day, serialized as `YYYY-MM-DD`.
    #[cfg_attr(feature = "serde", serde(with = "crate::day::serde_day"))]
    pub date: Date,
    /// Steps counted on that day.
    pub count: u64,
}

impl StepRecord {
    /// Create a record for `date` holding `count` steps.
    pub fn new(date: Date, count: u64) -> Self {
        Self { date, count }
    }

    /// An empty record for `date`.
    pub fn empty(date: Date) -> Self {
        Self::new(date, 0)
    }

    /// The record's day as a `YYYY-MM-DD` string.
    pub fn day_string(&self) -> String {
        format_day(self.date)
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} steps", format_day(self.date), self.count)
    }
}

/// A raw update pushed by the platform step sensor.
///
/// `steps` is an opaque counter: cumulative since boot on some devices,
/// since listener registration on others, and reset at unpredictable points.
/// Older bridges named the field `totalSteps`; both spellings deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawSensorEvent {
    /// Raw counter value.
    #[cfg_attr(feature = "serde", serde(alias = "totalSteps", alias = "total_steps"))]
    pub steps: u64,
    /// Calendar day the sensor attributed the reading to.
    #[cfg_attr(feature = "serde", serde(with = "crate::day::serde_day"))]
    pub date: Date,
}

impl RawSensorEvent {
    /// Create a new raw event.
    pub fn new(steps: u64, date: Date) -> Self {
        Self { steps, date }
    }
}

/// Point-in-time answer to a sensor `getSnapshot()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorSnapshot {
    /// Raw counter value at the time of the snapshot.
    #[cfg_attr(feature = "serde", serde(alias = "totalSteps", alias = "total_steps"))]
    pub steps: u64,
    /// Calendar day of the snapshot.
    #[cfg_attr(feature = "serde", serde(with = "crate::day::serde_day"))]
    pub date: Date,
}

impl From<SensorSnapshot> for RawSensorEvent {
    fn from(snapshot: SensorSnapshot) -> Self {
        RawSensorEvent::new(snapshot.steps, snapshot.date)
    }
}

/// A per-user, per-day document in the remote store.
///
/// Documents are keyed by `"{user_uid}_{date}"`. Writes follow the
/// upsert-if-greater rule: an incoming document replaces the stored one only
/// when its `steps` is strictly larger.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RemoteStepDoc {
    /// Owner of the document.
    #[cfg_attr(feature = "serde", serde(rename = "userUid", alias = "user_uid"))]
    pub user_uid: String,
    /// Calendar day, serialized as `YYYY-MM-DD`.
    #[cfg_attr(feature = "serde", serde(with = "crate::day::serde_day"))]
    pub date: Date,
    /// Day total at the time of the write.
    pub steps: u64,
    /// When the write was issued.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl RemoteStepDoc {
    /// Build a document for `user_uid` from a local record, stamped now.
    pub fn from_record(user_uid: &str, record: &StepRecord) -> Self {
        Self {
            user_uid: user_uid.to_string(),
            date: record.date,
            steps: record.count,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Document key, `"{user_uid}_{YYYY-MM-DD}"`.
    pub fn key(&self) -> String {
        doc_key(&self.user_uid, self.date)
    }

    /// The document as a local record.
    pub fn to_record(&self) -> StepRecord {
        StepRecord::new(self.date, self.steps)
    }
}

/// Build a remote document key from its parts.
///
/// ```
/// use stride_types::{doc_key, parse_day};
///
/// let day = parse_day("2024-01-02").unwrap();
/// assert_eq!(doc_key("user-1", day), "user-1_2024-01-02");
/// ```
pub fn doc_key(user_uid: &str, date: Date) -> String {
    format!("{}_{}", user_uid, format_day(date))
}

/// Split a remote document key back into `(user_uid, date)`.
///
/// The date is always the last `_`-separated segment, so user ids may
/// themselves contain underscores.
pub fn split_doc_key(key: &str) -> ParseResult<(String, Date)> {
    let (user, day) = key
        .rsplit_once('_')
        .ok_or_else(|| ParseError::InvalidKey(key.to_string()))?;
    if user.is_empty() {
        return Err(ParseError::InvalidKey(key.to_string()));
    }
    Ok((user.to_string(), parse_day(day)?))
}
