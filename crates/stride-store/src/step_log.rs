//! Day-indexed step list on top of a key-value store.
//!
//! The whole list lives JSON-serialized under a single key, matching the
//! `get(key)` / `set(key, list)` contract of device preference storage.

use std::collections::BTreeMap;

use time::Date;
use tracing::{debug, warn};

use stride_types::StepRecord;

use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::models::Checkpoint;
use crate::queries::HistoryQuery;

/// Key holding the serialized day list.
pub const STEPS_KEY: &str = "stride.steps";

/// Key holding the serialized reconciler checkpoint.
pub const CHECKPOINT_KEY: &str = "stride.checkpoint";

/// The local per-day step log.
pub struct StepLog {
    kv: Box<dyn KeyValueStore + Send>,
}

impl std::fmt::Debug for StepLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepLog").finish_non_exhaustive()
    }
}

impl StepLog {
    /// Wrap a key-value backend.
    pub fn new(kv: impl KeyValueStore + Send + 'static) -> Self {
        Self { kv: Box::new(kv) }
    }

    /// All records, oldest first, at most one per date.
    ///
    /// A missing key reads as an empty list. Lists written by older builds
    /// could hold the same date twice; the larger count wins.
    pub fn records(&self) -> Result<Vec<StepRecord>> {
        let Some(raw) = self.kv.get(STEPS_KEY)? else {
            return Ok(Vec::new());
        };

        let stored: Vec<StepRecord> = serde_json::from_str(&raw)?;
        let stored_len = stored.len();

        let mut by_day: BTreeMap<Date, u64> = BTreeMap::new();
        for record in stored {
            let count = by_day.entry(record.date).or_insert(0);
            *count = (*count).max(record.count);
        }

        if by_day.len() != stored_len {
            warn!(
                "Step log held {} duplicate day entries, keeping the larger counts",
                stored_len - by_day.len()
            );
        }

        Ok(by_day
            .into_iter()
            .map(|(date, count)| StepRecord::new(date, count))
            .collect())
    }

    /// The record for `date`, if one was written.
    pub fn get(&self, date: Date) -> Result<Option<StepRecord>> {
        Ok(self.records()?.into_iter().find(|r| r.date == date))
    }

    /// Write `record`, raising any existing record for the same date.
    ///
    /// A day's count never goes down once written: a smaller count for a
    /// stored date leaves the stored record as it is.
    pub fn upsert(&self, record: StepRecord) -> Result<()> {
        let mut records = self.records()?;

        match records.iter_mut().find(|r| r.date == record.date) {
            Some(existing) if existing.count > record.count => {
                debug!("Kept {} over lower count {}", existing, record.count);
                return Ok(());
            }
            Some(existing) => existing.count = record.count,
            None => {
                records.push(record);
                records.sort_by_key(|r| r.date);
            }
        }

        self.kv.set(STEPS_KEY, &serde_json::to_string(&records)?)?;
        debug!("Saved {}", record);
        Ok(())
    }

    /// Records matching `query`.
    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<StepRecord>> {
        Ok(query.apply(self.records()?))
    }

    /// Number of days recorded.
    pub fn len(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    /// Sum of all recorded days.
    pub fn total_steps(&self) -> Result<u64> {
        Ok(self
            .records()?
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.count)))
    }

    /// The last saved reconciler checkpoint.
    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        match self.kv.get(CHECKPOINT_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Persist the reconciler checkpoint.
    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.kv
            .set(CHECKPOINT_KEY, &serde_json::to_string(checkpoint)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use crate::store::Store;
    use time::macros::date;

    #[test]
    fn test_empty_log() {
        let log = StepLog::new(MemoryKv::new());
        assert!(log.records().unwrap().is_empty());
        assert_eq!(log.get(date!(2024 - 01 - 01)).unwrap(), None);
        assert_eq!(log.load_checkpoint().unwrap(), None);
    }

    #[test]
    fn test_upsert_overwrites_by_date() {
        let log = StepLog::new(MemoryKv::new());
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 100)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 250)).unwrap();

        let records = log.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 250);
    }

    #[test]
    fn test_upsert_never_lowers_a_day() {
        let log = StepLog::new(MemoryKv::new());
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 500)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 0)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 499)).unwrap();

        assert_eq!(
            log.get(date!(2024 - 01 - 01)).unwrap(),
            Some(StepRecord::new(date!(2024 - 01 - 01), 500))
        );
    }

    #[test]
    fn test_new_day_leaves_previous_untouched() {
        let log = StepLog::new(MemoryKv::new());
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 500)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 02), 30)).unwrap();

        let records = log.records().unwrap();
        assert_eq!(
            records,
            vec![
                StepRecord::new(date!(2024 - 01 - 01), 500),
                StepRecord::new(date!(2024 - 01 - 02), 30),
            ]
        );
    }

    #[test]
    fn test_records_sorted_oldest_first() {
        let log = StepLog::new(MemoryKv::new());
        log.upsert(StepRecord::new(date!(2024 - 01 - 03), 3)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 1)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 02), 2)).unwrap();

        let counts: Vec<u64> = log.records().unwrap().iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_days_collapse_to_max() {
        let kv = MemoryKv::new();
        kv.set(
            STEPS_KEY,
            r#"[{"date":"2024-01-01","count":80},{"date":"2024-01-01","count":120}]"#,
        )
        .unwrap();

        let log = StepLog::new(kv);
        let records = log.records().unwrap();
        assert_eq!(records, vec![StepRecord::new(date!(2024 - 01 - 01), 120)]);
    }

    #[test]
    fn test_corrupt_list_is_an_error() {
        let kv = MemoryKv::new();
        kv.set(STEPS_KEY, "not json").unwrap();

        let log = StepLog::new(kv);
        assert!(matches!(
            log.records(),
            Err(crate::Error::Serialization(_))
        ));
    }

    #[test]
    fn test_history_and_totals() {
        let log = StepLog::new(MemoryKv::new());
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 10)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 02), 20)).unwrap();

        let history = log.history(&HistoryQuery::new()).unwrap();
        assert_eq!(history[0].date, date!(2024 - 01 - 02));
        assert_eq!(log.len().unwrap(), 2);
        assert_eq!(log.total_steps().unwrap(), 30);
    }

    #[test]
    fn test_checkpoint_round_trip_on_sqlite() {
        let log = StepLog::new(Store::open_in_memory().unwrap());
        let checkpoint = Checkpoint {
            day: date!(2024 - 01 - 01),
            day_total: 250,
            last_raw: Some(90),
        };

        log.save_checkpoint(&checkpoint).unwrap();
        assert_eq!(log.load_checkpoint().unwrap(), Some(checkpoint));
    }
}
