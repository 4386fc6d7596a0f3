//! Platform-agnostic types for daily step counting.
//!
//! This crate provides the shared data model used by the reconciler
//! (stride-core), the persistence layer (stride-store) and the CLI.
//!
//! # Features
//!
//! - Per-day step records and raw sensor events
//! - Remote document shape and key scheme
//! - `YYYY-MM-DD` day parsing and formatting
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use stride_types::{StepRecord, parse_day};
//!
//! let record = StepRecord::new(parse_day("2024-01-01").unwrap(), 500);
//! assert_eq!(record.to_string(), "2024-01-01: 500 steps");
//! ```

pub mod day;
pub mod error;
pub mod types;

pub use day::{format_day, parse_day};
pub use error::{ParseError, ParseResult};
pub use types::{RawSensorEvent, RemoteStepDoc, SensorSnapshot, StepRecord, doc_key, split_doc_key};


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use time::{Date, Duration};

    fn any_day() -> impl Strategy<Value = Date> {
        (0i64..40_000).prop_map(|offset| {
            time::macros::date!(1970 - 01 - 01) + Duration::days(offset)
        })
    }

    proptest! {
        #[test]
        fn day_string_round_trips(day in any_day()) {
            prop_assert_eq!(parse_day(&format_day(day)).unwrap(), day);
        }

        #[test]
        fn doc_key_round_trips(user in "[a-zA-Z0-9_]{1,24}", day in any_day()) {
            let key = doc_key(&user, day);
            let (parsed_user, parsed_day) = split_doc_key(&key).unwrap();
            prop_assert_eq!(parsed_user, user);
            prop_assert_eq!(parsed_day, day);
        }
    }
}
