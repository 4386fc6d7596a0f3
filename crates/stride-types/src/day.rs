//! Calendar day strings.
//!
//! Every record in the system is bucketed by a calendar day written as
//! `YYYY-MM-DD`. Which timezone that day belongs to is decided by the caller
//! (see `stride_core::clock`); this module only converts between the string
//! form and [`time::Date`].

use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::error::{ParseError, ParseResult};

/// `YYYY-MM-DD`, zero padded.
const DAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parse a `YYYY-MM-DD` string into a [`Date`].
///
/// # Examples
///
/// ```
/// use stride_types::{format_day, parse_day};
///
/// let day = parse_day("2024-01-02").unwrap();
/// assert_eq!(format_day(day), "2024-01-02");
/// assert!(parse_day("2024-1-2").is_err());
/// ```
pub fn parse_day(input: &str) -> ParseResult<Date> {
    Date::parse(input.trim(), DAY_FORMAT).map_err(|_| ParseError::invalid_day(input))
}

/// Format a [`Date`] as `YYYY-MM-DD`.
pub fn format_day(day: Date) -> String {
    // The format only uses year/month/day components, which every Date has.
    day.format(DAY_FORMAT)
        .unwrap_or_else(|_| format!("{:04}-{:02}-{:02}", day.year(), u8::from(day.month()), day.day()))
}

/// Serde adapter storing a [`Date`] as a `YYYY-MM-DD` string.
///
/// Use with `#[serde(with = "stride_types::day::serde_day")]`.
#[cfg(feature = "serde")]
pub mod serde_day {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(day: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_day(*day))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_day(&raw).map_err(serde::de::Error::custom)
    }
}
