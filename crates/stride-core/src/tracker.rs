//! The step tracking loop.
//!
//! [`StepTracker`] wires a [`StepSensor`] to the reconciler and to storage:
//!
//! 1. Gate on runtime permissions.
//! 2. Restore today's state from the local checkpoint, finalizing a day that
//!    ended while the process was down.
//! 3. Start the sensor, fold in its snapshot, then apply every pushed reading
//!    in arrival order.
//! 4. For each transition, write the local store synchronously and hand
//!    remote writes to background tasks.
//! 5. Stop the sensor on cancellation or when its stream ends.
//!
//! Storage failures never stop the loop. The in-memory total stays correct
//! and the next successful write catches the store up.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stride_store::{RemoteStore, StepLog};
use stride_types::{RawSensorEvent, RemoteStepDoc, StepRecord};

use crate::clock::{DayClock, FixedOffsetClock};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, TrackerEvent};
use crate::permissions::{GateResult, PermissionProvider, Platform, StaticPermissions, request_all};
use crate::reconciler::{Effect, ReconcilerState, Transition};
use crate::retry::{RetryConfig, with_retry};
use crate::sensor::StepSensor;

/// Settings for a [`StepTracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Owner of the remote documents.
    pub user_uid: String,
    /// Platform for the permission gate.
    pub platform: Platform,
    /// Retry policy for remote writes.
    pub retry: RetryConfig,
    /// How long to wait for in-flight remote writes when stopping.
    pub flush_timeout: Duration,
}

impl TrackerConfig {
    /// Defaults for `user_uid`: no permission gate, no remote retries.
    pub fn new(user_uid: impl Into<String>) -> Self {
        Self {
            user_uid: user_uid.into(),
            platform: Platform::Other,
            retry: RetryConfig::none(),
            flush_timeout: Duration::from_secs(10),
        }
    }

    /// Set the platform.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Set the remote retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the shutdown flush timeout.
    #[must_use]
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.user_uid.trim().is_empty() {
            return Err(Error::invalid_config("user_uid must not be empty"));
        }
        if self.user_uid.contains('_') {
            // Document keys are "{user}_{date}".
            warn!("user_uid '{}' contains '_'", self.user_uid);
        }
        Ok(())
    }
}

/// What a tracker run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSummary {
    /// Today's record when counting started.
    pub started: Option<StepRecord>,
    /// Today's record when counting stopped.
    pub finished: Option<StepRecord>,
    /// Readings applied, snapshot included.
    pub readings: u64,
    /// Steps added during the run.
    pub steps_added: u64,
    /// Counter resets seen.
    pub counter_resets: u64,
    /// Days finalized during the run, oldest first.
    pub days_closed: Vec<StepRecord>,
    /// Local writes that failed.
    pub persist_failures: u64,
    /// Remote writes that completed.
    pub syncs_completed: u64,
    /// Remote writes that failed or did not finish in time.
    pub syncs_failed: u64,
    /// Last sensor error, if the sensor misbehaved.
    pub sensor_error: Option<String>,
    /// Whether the run ended by cancellation.
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct SyncCounters {
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Drives a step sensor into the local and remote stores.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stride_core::{MockSensor, StepTracker, TrackerConfig};
/// use stride_store::{MemoryKv, StepLog};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> stride_core::Result<()> {
/// let sensor = Arc::new(MockSensor::new());
/// let mut tracker = StepTracker::new(
///     sensor.clone(),
///     StepLog::new(MemoryKv::new()),
///     TrackerConfig::new("user-1"),
/// );
///
/// let cancel = CancellationToken::new();
/// cancel.cancel();
/// let summary = tracker.run(cancel).await?;
/// assert!(summary.cancelled);
/// # Ok(())
/// # }
/// ```
pub struct StepTracker {
    sensor: Arc<dyn StepSensor>,
    clock: Arc<dyn DayClock>,
    log: StepLog,
    remote: Option<Arc<dyn RemoteStore>>,
    permissions: Arc<dyn PermissionProvider>,
    config: TrackerConfig,
    events: EventDispatcher,
    state: Option<ReconcilerState>,
    pending: Vec<JoinHandle<()>>,
    counters: Arc<SyncCounters>,
}

impl std::fmt::Debug for StepTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepTracker")
            .field("sensor", &self.sensor.name())
            .field("user_uid", &self.config.user_uid)
            .field("state", &self.state)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl StepTracker {
    /// Create a tracker with a local-offset clock, no remote store and no
    /// permission requirements.
    pub fn new(sensor: Arc<dyn StepSensor>, log: StepLog, config: TrackerConfig) -> Self {
        Self {
            sensor,
            clock: Arc::new(FixedOffsetClock::local_or_utc()),
            log,
            remote: None,
            permissions: Arc::new(StaticPermissions::all_granted()),
            config,
            events: EventDispatcher::default(),
            state: None,
            pending: Vec::new(),
            counters: Arc::new(SyncCounters::default()),
        }
    }

    /// Use `clock` for day boundaries.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn DayClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mirror days to `remote`.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Ask `permissions` before counting.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Publish events on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// Subscribe to tracker events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Today's record as last seen, if the tracker has run.
    pub fn current(&self) -> Option<StepRecord> {
        self.state.map(|s| s.record())
    }

    /// The local step log.
    pub fn log(&self) -> &StepLog {
        &self.log
    }

    /// Count steps until `cancel` fires or the sensor stream ends.
    ///
    /// Returns [`Error::PermissionDenied`] without touching the sensor when
    /// the permission gate refuses; the caller may prompt and call again.
    /// Sensor and storage failures are reported in the summary instead.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<TrackerSummary> {
        self.config.validate()?;

        let permissions = Arc::clone(&self.permissions);
        if let GateResult::Denied(permission) =
            request_all(permissions.as_ref(), self.config.platform).await
        {
            self.events.send(TrackerEvent::PermissionDenied { permission });
            return Err(Error::PermissionDenied(permission));
        }

        let mut summary = TrackerSummary::default();
        let mut state = self.restore(&mut summary);
        self.state = Some(state);
        summary.started = Some(state.record());
        self.events.send(TrackerEvent::Started {
            today: state.record(),
        });
        info!("Tracking steps for {} from {}", self.config.user_uid, state.record());

        let sensor = Arc::clone(&self.sensor);
        let receiver = match sensor.start_counting().await {
            Ok(()) => {
                match sensor.snapshot().await {
                    Ok(snapshot) => {
                        self.apply(&mut state, RawSensorEvent::from(snapshot), &mut summary)
                    }
                    Err(e) => self.sensor_failed(&e, &mut summary),
                }
                match sensor.subscribe().await {
                    Ok(rx) => Some(rx),
                    Err(e) => {
                        self.sensor_failed(&e, &mut summary);
                        None
                    }
                }
            }
            Err(e) => {
                self.sensor_failed(&e, &mut summary);
                None
            }
        };

        if let Some(mut rx) = receiver {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Tracker cancelled");
                        summary.cancelled = true;
                        break;
                    }
                    event = rx.recv() => match event {
                        Some(event) => self.apply(&mut state, event, &mut summary),
                        None => {
                            debug!("{} stream ended", sensor.name());
                            break;
                        }
                    }
                }
            }
        } else {
            summary.cancelled = cancel.is_cancelled();
        }

        if let Err(e) = sensor.stop_counting().await {
            warn!("Failed to stop {}: {}", sensor.name(), e);
        }

        self.flush().await;
        summary.syncs_completed = self.counters.completed.swap(0, Ordering::Relaxed);
        summary.syncs_failed = self.counters.failed.swap(0, Ordering::Relaxed);
        summary.finished = Some(state.record());

        self.events.send(TrackerEvent::Stopped {
            today: state.record(),
        });
        info!("Stopped tracking at {}", state.record());
        Ok(summary)
    }

    /// Rebuild today's state from memory or the local checkpoint.
    fn restore(&mut self, summary: &mut TrackerSummary) -> ReconcilerState {
        let today = self.clock.today();

        let checkpoint = match self.state {
            Some(state) => Some(state.checkpoint()),
            None => self.log.load_checkpoint().unwrap_or_else(|e| {
                warn!("Could not read checkpoint, starting fresh: {}", e);
                None
            }),
        };

        let mut state = match checkpoint {
            Some(checkpoint) => {
                let (state, stale) = ReconcilerState::resume(checkpoint, today);
                if let Some(record) = stale {
                    let record = self.at_least_stored(record);
                    info!("Finalizing {} left open by the previous run", record);
                    self.execute(Effect::PersistLocal(record), summary);
                    self.execute(Effect::SyncRemote(record), summary);
                    summary.days_closed.push(record);
                    self.events.send(TrackerEvent::DayClosed { record });
                }
                state
            }
            None => ReconcilerState::new(today),
        };

        // Never restart below what is already on disk for today.
        let stored = self.at_least_stored(state.record());
        if stored.count > state.day_total {
            debug!("Adopting stored total {} for {}", stored.count, stored.day_string());
            state.day_total = stored.count;
        }
        state
    }

    fn at_least_stored(&self, record: StepRecord) -> StepRecord {
        match self.log.get(record.date) {
            Ok(Some(stored)) if stored.count > record.count => stored,
            Ok(_) => record,
            Err(e) => {
                warn!("Could not read stored total for {}: {}", record.day_string(), e);
                record
            }
        }
    }

    /// Open a day that already has a stored record from that record's total.
    fn adopt_stored(&self, state: &mut ReconcilerState, transition: &mut Transition) {
        let stored = self.at_least_stored(state.record());
        if stored.count <= state.day_total {
            return;
        }

        debug!("Resuming {} from its stored total", stored);
        state.day_total = stored.count;
        transition.state = *state;
        transition.today = stored;
        for effect in &mut transition.effects {
            match effect {
                Effect::PersistLocal(record) | Effect::SyncRemote(record)
                    if record.date == stored.date =>
                {
                    *record = stored;
                }
                _ => {}
            }
        }
    }

    fn apply(&mut self, state: &mut ReconcilerState, event: RawSensorEvent, summary: &mut TrackerSummary) {
        let day = self.clock.day_of(&event);
        let previous_raw = state.last_raw;
        let mut transition = state.apply(event.steps, day);
        if transition.closed.is_some() {
            self.adopt_stored(state, &mut transition);
        }
        self.state = Some(*state);

        summary.readings += 1;
        summary.steps_added = summary.steps_added.saturating_add(transition.delta);
        debug!(
            "Reading {} on {} -> {} (+{})",
            event.steps,
            day,
            transition.today.count,
            transition.delta
        );

        if transition.counter_reset {
            summary.counter_resets += 1;
            let previous = previous_raw.unwrap_or_default();
            info!("Step counter reset ({} -> {}), re-anchoring", previous, event.steps);
            self.events.send(TrackerEvent::CounterReset {
                raw: event.steps,
                previous,
            });
        }

        for effect in &transition.effects {
            self.execute(*effect, summary);
        }
        if !transition.effects.is_empty()
            && let Err(e) = self.log.save_checkpoint(&state.checkpoint())
        {
            self.persist_failed(&e.into(), summary);
        }

        if let Some(record) = transition.closed {
            info!("Closed {}", record);
            summary.days_closed.push(record);
            self.events.send(TrackerEvent::DayClosed { record });
        }
        if transition.delta > 0 || transition.closed.is_some() {
            self.events.send(TrackerEvent::Updated {
                today: transition.today,
                delta: transition.delta,
            });
        }
    }

    fn execute(&mut self, effect: Effect, summary: &mut TrackerSummary) {
        match effect {
            Effect::PersistLocal(record) => {
                if let Err(e) = self.log.upsert(record) {
                    self.persist_failed(&e.into(), summary);
                }
            }
            Effect::SyncRemote(record) => self.spawn_sync(record),
        }
    }

    fn spawn_sync(&mut self, record: StepRecord) {
        let Some(remote) = self.remote.as_ref().map(Arc::clone) else {
            return;
        };

        let doc = RemoteStepDoc::from_record(&self.config.user_uid, &record);
        let retry = self.config.retry.clone();
        let events = self.events.clone();
        let counters = Arc::clone(&self.counters);

        self.pending.retain(|handle| !handle.is_finished());
        self.pending.push(tokio::spawn(async move {
            let key = doc.key();
            let result = with_retry(&retry, "remote upsert", || {
                let remote = Arc::clone(&remote);
                let doc = doc.clone();
                async move {
                    tokio::task::spawn_blocking(move || remote.upsert_if_greater(&doc))
                        .await
                        .map_err(Error::remote)?
                        .map_err(Error::remote)
                }
            })
            .await;

            match result {
                Ok(outcome) => {
                    debug!("Synced {}: {:?}", key, outcome);
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    events.send(TrackerEvent::SyncCompleted { key, outcome });
                }
                Err(e) => {
                    warn!("Remote write for {} dropped: {}", key, e);
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    events.send(TrackerEvent::SyncFailed {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }));
    }

    /// Wait for in-flight remote writes, up to the flush timeout.
    async fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return;
        }

        let count = pending.len();
        debug!("Waiting for {} remote writes", count);
        let aborts: Vec<_> = pending.iter().map(|h| h.abort_handle()).collect();

        let flushed = tokio::time::timeout(
            self.config.flush_timeout,
            futures::future::join_all(pending),
        )
        .await;

        if flushed.is_err() {
            let unfinished = aborts.iter().filter(|h| !h.is_finished()).count() as u64;
            warn!("{} remote writes still pending after {:?}, abandoning", unfinished, self.config.flush_timeout);
            for handle in &aborts {
                handle.abort();
            }
            self.counters.failed.fetch_add(unfinished, Ordering::Relaxed);
        }
    }

    fn sensor_failed(&self, error: &Error, summary: &mut TrackerSummary) {
        warn!("{} failed: {}", self.sensor.name(), error);
        summary.sensor_error = Some(error.to_string());
        self.events.send(TrackerEvent::SensorFailed {
            error: error.to_string(),
        });
    }

    fn persist_failed(&self, error: &Error, summary: &mut TrackerSummary) {
        warn!("Local write dropped: {}", error);
        summary.persist_failures += 1;
        self.events.send(TrackerEvent::PersistFailed {
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::MockSensor;
    use crate::permissions::Permission;
    use stride_store::{Checkpoint, KeyValueStore, MemoryKv, MemoryRemote, STEPS_KEY};
    use time::macros::date;

    fn tracker_on(sensor: Arc<MockSensor>, day: time::Date) -> (StepTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(day));
        let tracker = StepTracker::new(
            sensor,
            StepLog::new(MemoryKv::new()),
            TrackerConfig::new("user-1"),
        )
        .with_clock(clock.clone());
        (tracker, clock)
    }

    #[tokio::test]
    async fn test_permission_denied_does_not_start_sensor() {
        let sensor = Arc::new(MockSensor::new());
        let (tracker, _) = tracker_on(sensor.clone(), date!(2024 - 01 - 01));
        let mut tracker = tracker
            .with_permissions(Arc::new(StaticPermissions::none()));
        tracker.config.platform = Platform::Android { api_level: 34 };
        let mut events = tracker.subscribe();

        let result = tracker.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(Error::PermissionDenied(Permission::Notifications))
        ));
        assert_eq!(sensor.start_count(), 0);
        assert_eq!(
            events.recv().await.unwrap(),
            TrackerEvent::PermissionDenied {
                permission: Permission::Notifications
            }
        );
    }

    #[tokio::test]
    async fn test_empty_user_is_rejected() {
        let sensor = Arc::new(MockSensor::new());
        let mut tracker = StepTracker::new(
            sensor,
            StepLog::new(MemoryKv::new()),
            TrackerConfig::new("  "),
        );
        assert!(matches!(
            tracker.run(CancellationToken::new()).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_sensor_reports_last_known_total() {
        let sensor = Arc::new(MockSensor::builder().unavailable().build());
        let (mut tracker, _) = tracker_on(sensor, date!(2024 - 01 - 01));
        tracker
            .log
            .upsert(StepRecord::new(date!(2024 - 01 - 01), 321))
            .unwrap();

        let summary = tracker.run(CancellationToken::new()).await.unwrap();

        assert!(summary.sensor_error.is_some());
        assert_eq!(
            summary.finished,
            Some(StepRecord::new(date!(2024 - 01 - 01), 321))
        );
        assert_eq!(summary.readings, 0);
    }

    #[tokio::test]
    async fn test_restore_finalizes_stale_checkpoint() {
        let sensor = Arc::new(MockSensor::new());
        let (mut tracker, _) = tracker_on(sensor, date!(2024 - 01 - 02));
        let remote = Arc::new(MemoryRemote::new());
        tracker = tracker.with_remote(remote.clone());
        tracker
            .log
            .save_checkpoint(&Checkpoint {
                day: date!(2024 - 01 - 01),
                day_total: 480,
                last_raw: Some(9000),
            })
            .unwrap();

        let mut summary = TrackerSummary::default();
        let state = tracker.restore(&mut summary);
        tracker.flush().await;

        assert_eq!(state, ReconcilerState::new(date!(2024 - 01 - 02)));
        assert_eq!(
            summary.days_closed,
            vec![StepRecord::new(date!(2024 - 01 - 01), 480)]
        );
        assert_eq!(
            tracker.log.get(date!(2024 - 01 - 01)).unwrap(),
            Some(StepRecord::new(date!(2024 - 01 - 01), 480))
        );
        assert_eq!(remote.get("user-1_2024-01-01").unwrap().unwrap().steps, 480);
    }

    #[tokio::test]
    async fn test_restore_never_goes_below_stored_total() {
        let sensor = Arc::new(MockSensor::new());
        let (mut tracker, _) = tracker_on(sensor, date!(2024 - 01 - 01));
        tracker
            .log
            .upsert(StepRecord::new(date!(2024 - 01 - 01), 700))
            .unwrap();

        let state = tracker.restore(&mut TrackerSummary::default());
        assert_eq!(state.day_total, 700);
        assert_eq!(state.last_raw, None);
    }

    #[tokio::test]
    async fn test_corrupt_log_does_not_stop_counting() {
        let kv = MemoryKv::new();
        kv.set(STEPS_KEY, "{broken").unwrap();

        let sensor = Arc::new(
            MockSensor::builder()
                .date(date!(2024 - 01 - 01))
                .steps(100)
                .build(),
        );
        let mut tracker = StepTracker::new(sensor.clone(), StepLog::new(kv), TrackerConfig::new("u"))
            .with_clock(Arc::new(ManualClock::new(date!(2024 - 01 - 01))));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(async move {
            let summary = tracker.run(cancel).await;
            (tracker, summary)
        });

        while sensor.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        sensor.emit(150).await;
        sensor.close_subscribers();

        let (tracker, summary) = handle.await.unwrap();
        let summary = summary.unwrap();
        assert!(summary.persist_failures > 0);
        assert_eq!(tracker.current(), Some(StepRecord::new(date!(2024 - 01 - 01), 50)));
    }
}
