//! Day-bucket reconciliation of a raw step counter.
//!
//! The platform step counter is an opaque integer that usually grows but
//! resets whenever the device reboots or the sensor service restarts. This
//! module turns that counter into one step total per calendar day.
//!
//! [`on_sensor_event`] is a pure transition: it takes the current state, one
//! raw reading and the calendar day the reading belongs to, and returns the
//! next state plus the side effects the caller must carry out. Nothing here
//! touches storage or the network.
//!
//! # Rules
//!
//! 1. A change of day closes the current day and starts the new one at zero.
//!    The reading that crossed the boundary becomes the new day's baseline.
//! 2. The first reading after (re)initialization only sets the baseline, so
//!    steps counted before the tracker started never show up as a spike.
//! 3. A reading at or above the baseline adds the difference.
//! 4. A reading below the baseline is a counter reset: it becomes the new
//!    baseline and adds nothing.
//!
//! # Example
//!
//! ```
//! use stride_core::reconciler::{ReconcilerState, on_sensor_event};
//! use time::macros::date;
//!
//! let day = date!(2024 - 01 - 01);
//! let mut state = ReconcilerState::new(day);
//! for raw in [1000, 1050, 1200, 40, 90] {
//!     state = on_sensor_event(&state, raw, day).state;
//! }
//! assert_eq!(state.day_total, 250);
//! ```

use serde::{Deserialize, Serialize};
use time::Date;

use stride_store::Checkpoint;
use stride_types::StepRecord;

/// Running state for the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerState {
    /// Day being accumulated.
    #[serde(with = "stride_types::day::serde_day")]
    pub day: Date,
    /// Steps attributed to `day` so far.
    pub day_total: u64,
    /// Last raw counter value applied; `None` until the first reading.
    pub last_raw: Option<u64>,
}

impl ReconcilerState {
    /// Fresh state for `day` with no baseline.
    pub fn new(day: Date) -> Self {
        Self {
            day,
            day_total: 0,
            last_raw: None,
        }
    }

    /// Fresh state for `day` starting from an already recorded total.
    pub fn with_total(day: Date, day_total: u64) -> Self {
        Self {
            day,
            day_total,
            last_raw: None,
        }
    }

    /// Continue from a saved checkpoint.
    ///
    /// A checkpoint from `today` is restored as is, including its baseline,
    /// so steps walked while the process was down are counted as long as the
    /// counter did not reset. A checkpoint from any other day is stale: the
    /// returned state starts `today` from zero and the checkpoint's record is
    /// returned for finalization.
    pub fn resume(checkpoint: Checkpoint, today: Date) -> (Self, Option<StepRecord>) {
        if checkpoint.day == today {
            (
                Self {
                    day: checkpoint.day,
                    day_total: checkpoint.day_total,
                    last_raw: checkpoint.last_raw,
                },
                None,
            )
        } else {
            (
                Self::new(today),
                Some(StepRecord::new(checkpoint.day, checkpoint.day_total)),
            )
        }
    }

    /// Today's record as the state currently sees it.
    pub fn record(&self) -> StepRecord {
        StepRecord::new(self.day, self.day_total)
    }

    /// Snapshot for persistence.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            day: self.day,
            day_total: self.day_total,
            last_raw: self.last_raw,
        }
    }

    /// Apply one reading. Shorthand for [`on_sensor_event`].
    pub fn apply(&mut self, raw: u64, today: Date) -> Transition {
        let transition = on_sensor_event(self, raw, today);
        *self = transition.state;
        transition
    }
}

impl From<ReconcilerState> for Checkpoint {
    fn from(state: ReconcilerState) -> Self {
        state.checkpoint()
    }
}

/// Work the caller must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", content = "record", rename_all = "snake_case")]
pub enum Effect {
    /// Write the record to the local store, replacing the same date.
    PersistLocal(StepRecord),
    /// Push the record to the remote store with upsert-if-greater.
    SyncRemote(StepRecord),
}

impl Effect {
    /// The record the effect carries.
    pub fn record(&self) -> StepRecord {
        match self {
            Effect::PersistLocal(r) | Effect::SyncRemote(r) => *r,
        }
    }
}

/// What a single reading did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the reading.
    pub state: ReconcilerState,
    /// Today's record after the reading, for display.
    pub today: StepRecord,
    /// Steps this reading added.
    pub delta: u64,
    /// The day closed by this reading, if it crossed a day boundary.
    pub closed: Option<StepRecord>,
    /// Whether the reading was below the baseline.
    pub counter_reset: bool,
    /// Side effects, in the order they should be carried out.
    pub effects: Vec<Effect>,
}

/// Apply one raw reading that belongs to `today`.
pub fn on_sensor_event(state: &ReconcilerState, raw: u64, today: Date) -> Transition {
    let mut next = *state;
    let mut effects = Vec::new();
    let mut closed = None;

    if today != next.day {
        let finished = next.record();
        effects.push(Effect::PersistLocal(finished));
        effects.push(Effect::SyncRemote(finished));
        closed = Some(finished);
        next = ReconcilerState::new(today);
    }

    let opened_day = next.last_raw.is_none();
    let mut delta = 0;
    let mut counter_reset = false;

    match next.last_raw {
        None => {}
        Some(last) if raw >= last => {
            delta = raw - last;
            next.day_total = next.day_total.saturating_add(delta);
        }
        Some(_) => counter_reset = true,
    }
    next.last_raw = Some(raw);

    let today_record = next.record();
    if delta > 0 {
        effects.push(Effect::PersistLocal(today_record));
        effects.push(Effect::SyncRemote(today_record));
    } else if opened_day {
        // First reading of the day: make sure the day exists locally.
        effects.push(Effect::PersistLocal(today_record));
    }

    Transition {
        state: next,
        today: today_record,
        delta,
        closed,
        counter_reset,
        effects,
    }
}
