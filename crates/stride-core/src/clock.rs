//! Day boundary policy.
//!
//! Every day bucket is decided under one fixed UTC offset. The offset is
//! either configured (`+09:00`) or sampled once from the local zone at
//! startup and then held for the life of the process, so a midnight rollover
//! can never be seen twice because the zone moved underneath the tracker.

use std::sync::Mutex;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use tracing::{debug, warn};

use stride_types::RawSensorEvent;

use crate::error::{Error, Result};

const OFFSET_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// Source of the current calendar day.
pub trait DayClock: Send + Sync {
    /// The current calendar day.
    fn today(&self) -> Date;

    /// The day a sensor event belongs to.
    ///
    /// Defaults to [`today`](Self::today): the sensor's own date stamp is
    /// ignored so every bucket uses the same offset.
    fn day_of(&self, _event: &RawSensorEvent) -> Date {
        self.today()
    }
}

impl<C: DayClock + ?Sized> DayClock for std::sync::Arc<C> {
    fn today(&self) -> Date {
        (**self).today()
    }

    fn day_of(&self, event: &RawSensorEvent) -> Date {
        (**self).day_of(event)
    }
}

/// Parse a UTC offset such as `+09:00`, `-05:30`, `Z` or `UTC`.
pub fn parse_utc_offset(input: &str) -> Result<UtcOffset> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("z") || input.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(input, OFFSET_FORMAT)
        .map_err(|_| Error::invalid_config(format!("invalid UTC offset '{}'", input)))
}

/// Format an offset as `+HH:MM`.
pub fn format_utc_offset(offset: UtcOffset) -> String {
    let (h, m, _) = offset.as_hms();
    let sign = if offset.is_negative() { '-' } else { '+' };
    format!("{}{:02}:{:02}", sign, h.unsigned_abs(), m.unsigned_abs())
}

/// Wall clock pinned to one UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedOffsetClock {
    offset: UtcOffset,
}

impl FixedOffsetClock {
    /// Clock using `offset` for every day boundary.
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    /// Clock at UTC.
    pub fn utc() -> Self {
        Self::new(UtcOffset::UTC)
    }

    /// Sample the local offset once, falling back to UTC when it cannot be
    /// determined.
    pub fn local_or_utc() -> Self {
        match UtcOffset::current_local_offset() {
            Ok(offset) => {
                debug!("Using local UTC offset {}", format_utc_offset(offset));
                Self::new(offset)
            }
            Err(e) => {
                warn!("Could not determine local UTC offset ({}), using UTC", e);
                Self::utc()
            }
        }
    }

    /// Build from an optional configured offset string.
    pub fn from_config(offset: Option<&str>) -> Result<Self> {
        match offset {
            Some(s) => Ok(Self::new(parse_utc_offset(s)?)),
            None => Ok(Self::local_or_utc()),
        }
    }

    /// The pinned offset.
    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// The calendar day `instant` falls on under this clock's offset.
    pub fn day_at(&self, instant: OffsetDateTime) -> Date {
        instant.to_offset(self.offset).date()
    }
}

impl Default for FixedOffsetClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayClock for FixedOffsetClock {
    fn today(&self) -> Date {
        self.day_at(OffsetDateTime::now_utc())
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    day: Mutex<Date>,
}

impl ManualClock {
    /// Clock reading `day` until changed.
    pub fn new(day: Date) -> Self {
        Self {
            day: Mutex::new(day),
        }
    }

    /// Jump to `day`.
    pub fn set(&self, day: Date) {
        match self.day.lock() {
            Ok(mut guard) => *guard = day,
            Err(poisoned) => *poisoned.into_inner() = day,
        }
    }

    /// Move forward by `days` (backwards when negative).
    pub fn advance_days(&self, days: i64) {
        let next = self.today().saturating_add(Duration::days(days));
        self.set(next);
    }
}

impl DayClock for ManualClock {
    fn today(&self) -> Date {
        match self.day.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Clock that trusts the date stamped on each sensor event.
///
/// Used when replaying recorded sessions, where the recorded dates must
/// drive rollovers. [`today`](DayClock::today) is answered by the wrapped
/// clock.
#[derive(Debug)]
pub struct SensorDateClock<C> {
    fallback: C,
}

impl<C: DayClock> SensorDateClock<C> {
    /// Wrap `fallback`, used whenever no event is at hand.
    pub fn new(fallback: C) -> Self {
        Self { fallback }
    }
}

impl<C: DayClock> DayClock for SensorDateClock<C> {
    fn today(&self) -> Date {
        self.fallback.today()
    }

    fn day_of(&self, event: &RawSensorEvent) -> Date {
        event.date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, offset};

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+09:00").unwrap(), offset!(+9));
        assert_eq!(parse_utc_offset("-05:30").unwrap(), offset!(-5:30));
        assert_eq!(parse_utc_offset("Z").unwrap(), UtcOffset::UTC);
        assert_eq!(parse_utc_offset(" utc ").unwrap(), UtcOffset::UTC);
    }

    #[test]
    fn test_parse_utc_offset_invalid() {
        assert!(matches!(
            parse_utc_offset("Asia/Seoul"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(parse_utc_offset("9").is_err());
    }

    #[test]
    fn test_format_utc_offset() {
        assert_eq!(format_utc_offset(offset!(+9)), "+09:00");
        assert_eq!(format_utc_offset(offset!(-5:30)), "-05:30");
        assert_eq!(format_utc_offset(UtcOffset::UTC), "+00:00");
    }

    #[test]
    fn test_day_at_respects_offset() {
        let clock = FixedOffsetClock::new(offset!(+9));
        // 15:30 UTC is already the next day in +09:00.
        assert_eq!(
            clock.day_at(datetime!(2024-01-01 15:30 UTC)),
            date!(2024 - 01 - 02)
        );
        assert_eq!(
            FixedOffsetClock::utc().day_at(datetime!(2024-01-01 15:30 UTC)),
            date!(2024 - 01 - 01)
        );
    }

    #[test]
    fn test_from_config() {
        let clock = FixedOffsetClock::from_config(Some("+09:00")).unwrap();
        assert_eq!(clock.offset(), offset!(+9));
        assert!(FixedOffsetClock::from_config(Some("nonsense")).is_err());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(date!(2024 - 01 - 31));
        assert_eq!(clock.today(), date!(2024 - 01 - 31));

        clock.advance_days(1);
        assert_eq!(clock.today(), date!(2024 - 02 - 01));

        clock.set(date!(2023 - 12 - 31));
        assert_eq!(clock.today(), date!(2023 - 12 - 31));
    }

    #[test]
    fn test_default_day_of_ignores_event_date() {
        let clock = ManualClock::new(date!(2024 - 01 - 01));
        let event = RawSensorEvent::new(10, date!(2030 - 06 - 06));
        assert_eq!(clock.day_of(&event), date!(2024 - 01 - 01));
    }

    #[test]
    fn test_sensor_date_clock_uses_event_date() {
        let clock = SensorDateClock::new(ManualClock::new(date!(2024 - 01 - 01)));
        let event = RawSensorEvent::new(10, date!(2024 - 01 - 05));
        assert_eq!(clock.day_of(&event), date!(2024 - 01 - 05));
        assert_eq!(clock.today(), date!(2024 - 01 - 01));
    }
}
