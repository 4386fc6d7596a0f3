//! Query builder for stored step history.
//!
//! # Example
//!
//! ```
//! use stride_store::{HistoryQuery, MemoryKv, StepLog};
//! use time::macros::date;
//!
//! let log = StepLog::new(MemoryKv::new());
//! let query = HistoryQuery::new()
//!     .since(date!(2024 - 01 - 01))
//!     .limit(7);
//!
//! let week = log.history(&query)?;
//! assert!(week.is_empty());
//! # Ok::<(), stride_store::Error>(())
//! ```

use time::Date;

use stride_types::StepRecord;

/// Fluent query builder for day records.
///
/// By default, queries return every record ordered newest first.
#[derive(Debug, Default, Clone)]
pub struct HistoryQuery {
    /// Only include days on or after this date.
    pub since: Option<Date>,
    /// Only include days on or before this date.
    pub until: Option<Date>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by date descending (newest first).
    pub newest_first: bool,
}

impl HistoryQuery {
    /// Create a new query: no filters, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter to days on or after `day`.
    pub fn since(mut self, day: Date) -> Self {
        self.since = Some(day);
        self
    }

    /// Filter to days on or before `day`.
    pub fn until(mut self, day: Date) -> Self {
        self.until = Some(day);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results chronologically.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Whether `day` passes the date filters.
    pub fn matches(&self, day: Date) -> bool {
        self.since.is_none_or(|since| day >= since) && self.until.is_none_or(|until| day <= until)
    }

    /// Filter, order and paginate `records`.
    pub fn apply(&self, records: Vec<StepRecord>) -> Vec<StepRecord> {
        let mut selected: Vec<StepRecord> =
            records.into_iter().filter(|r| self.matches(r.date)).collect();

        if self.newest_first {
            selected.sort_by(|a, b| b.date.cmp(&a.date));
        } else {
            selected.sort_by(|a, b| a.date.cmp(&b.date));
        }

        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map(|l| l as usize).unwrap_or(usize::MAX);

        selected.into_iter().skip(offset).take(limit).collect()
    }
}
