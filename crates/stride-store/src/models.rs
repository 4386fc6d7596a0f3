//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::Date;

/// Reconciler progress saved alongside the day list.
///
/// Lets a restarted process continue the current day from where the last one
/// stopped instead of re-baselining from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Day the checkpoint belongs to.
    #[serde(with = "stride_types::day::serde_day")]
    pub day: Date,
    /// Steps accumulated on `day` so far.
    pub day_total: u64,
    /// Last raw counter value applied, if any event was seen.
    pub last_raw: Option<u64>,
}

/// Result of a conditional remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No document existed; it was created.
    Created,
    /// The stored document held fewer steps and was replaced.
    Updated { previous: u64 },
    /// The stored document held at least as many steps; nothing changed.
    Unchanged { existing: u64 },
}

impl UpsertOutcome {
    /// Whether the write changed the stored document.
    pub fn applied(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_checkpoint_serialization() {
        let checkpoint = Checkpoint {
            day: date!(2024 - 01 - 01),
            day_total: 250,
            last_raw: Some(90),
        };
        let json = serde_json::to_string(&checkpoint).unwrap();
        assert_eq!(json, r#"{"day":"2024-01-01","day_total":250,"last_raw":90}"#);

        let parsed: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, checkpoint);
    }

    #[test]
    fn test_upsert_outcome_applied() {
        assert!(UpsertOutcome::Created.applied());
        assert!(UpsertOutcome::Updated { previous: 1 }.applied());
        assert!(!UpsertOutcome::Unchanged { existing: 5 }.applied());
    }

    #[test]
    fn test_upsert_outcome_serialization() {
        let json = serde_json::to_string(&UpsertOutcome::Updated { previous: 3 }).unwrap();
        assert_eq!(json, r#"{"outcome":"updated","previous":3}"#);
    }
}
