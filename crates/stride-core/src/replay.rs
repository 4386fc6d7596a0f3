//! Replay of recorded sensor sessions.
//!
//! [`ReplaySensor`] feeds a recorded list of raw readings through the
//! [`StepSensor`] interface, optionally paced, so a whole day (or a week) of
//! counter behaviour, including reboots and midnights, can be pushed through
//! the tracker from a file.
//!
//! Recordings are JSON: either an array of readings or one reading per line.
//!
//! ```text
//! [{"steps": 1000, "date": "2024-01-01"}, {"totalSteps": 1050, "date": "2024-01-01"}]
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use time::Date;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use stride_types::{RawSensorEvent, SensorSnapshot};

use crate::error::{Error, Result};
use crate::sensor::{DEFAULT_SENSOR_BUFFER, SensorReceiver, StepSensor, sensor_channel};

/// A sensor that replays recorded readings.
pub struct ReplaySensor {
    events: Arc<Vec<RawSensorEvent>>,
    pace: Option<Duration>,
    counting: AtomicBool,
    position: Arc<AtomicUsize>,
    cancel: Mutex<CancellationToken>,
}

impl std::fmt::Debug for ReplaySensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySensor")
            .field("events", &self.events.len())
            .field("position", &self.position.load(Ordering::Relaxed))
            .field("pace", &self.pace)
            .finish()
    }
}

impl ReplaySensor {
    /// Replay `events` as fast as the consumer reads them.
    pub fn new(events: Vec<RawSensorEvent>) -> Self {
        Self {
            events: Arc::new(events),
            pace: None,
            counting: AtomicBool::new(false),
            position: Arc::new(AtomicUsize::new(0)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Replay raw counter values all stamped with `date`.
    pub fn from_counts(counts: impl IntoIterator<Item = u64>, date: Date) -> Self {
        Self::new(
            counts
                .into_iter()
                .map(|steps| RawSensorEvent::new(steps, date))
                .collect(),
        )
    }

    /// Parse a recording: a JSON array, or one JSON reading per line.
    pub fn from_json(input: &str) -> Result<Self> {
        let trimmed = input.trim_start();
        let events = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(serde_json::from_str::<RawSensorEvent>)
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(Self::new(events))
    }

    /// Load a recording from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let sensor = Self::from_json(&contents)?;
        info!(
            "Loaded {} recorded readings from {}",
            sensor.events.len(),
            path.display()
        );
        Ok(sensor)
    }

    /// Wait `pace` before each reading.
    #[must_use]
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = (!pace.is_zero()).then_some(pace);
        self
    }

    /// The recorded readings.
    pub fn events(&self) -> &[RawSensorEvent] {
        &self.events
    }

    /// Readings delivered so far.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }

    /// Date of the first recorded reading.
    pub fn first_date(&self) -> Option<Date> {
        self.events.first().map(|e| e.date)
    }

    fn token(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Drop for ReplaySensor {
    fn drop(&mut self) {
        self.token().cancel();
    }
}

#[async_trait]
impl StepSensor for ReplaySensor {
    fn name(&self) -> &str {
        "replay"
    }

    async fn start_counting(&self) -> Result<()> {
        if self.counting.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        // A stopped replay gets a fresh token so it can be resumed.
        if let Ok(mut token) = self.cancel.lock()
            && token.is_cancelled()
        {
            *token = CancellationToken::new();
        }
        Ok(())
    }

    async fn stop_counting(&self) -> Result<()> {
        self.counting.store(false, Ordering::Relaxed);
        self.token().cancel();
        Ok(())
    }

    async fn snapshot(&self) -> Result<SensorSnapshot> {
        if !self.counting.load(Ordering::Relaxed) {
            return Err(Error::NotCounting);
        }

        let position = self.position.load(Ordering::Relaxed);
        let event = self
            .events
            .get(position.saturating_sub(1))
            .ok_or_else(|| Error::sensor("recording is empty"))?;
        Ok(SensorSnapshot {
            steps: event.steps,
            date: event.date,
        })
    }

    async fn subscribe(&self) -> Result<SensorReceiver> {
        if !self.counting.load(Ordering::Relaxed) {
            return Err(Error::NotCounting);
        }

        let (tx, rx) = sensor_channel(DEFAULT_SENSOR_BUFFER);
        let events = Arc::clone(&self.events);
        let position = Arc::clone(&self.position);
        let token = self.token();
        let pace = self.pace;

        tokio::spawn(async move {
            let mut ticker = pace.map(interval);

            while let Some(event) = events.get(position.load(Ordering::Relaxed)).copied() {
                if let Some(ticker) = ticker.as_mut() {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            debug!("Replay receiver dropped, stopping");
                            break;
                        }
                    }
                }
                position.fetch_add(1, Ordering::Relaxed);
            }

            debug!(
                "Replay finished at {}/{}",
                position.load(Ordering::Relaxed),
                events.len()
            );
        });

        Ok(rx)
    }
}
