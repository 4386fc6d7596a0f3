//! Mock step sensor for testing.
//!
//! [`MockSensor`] implements [`StepSensor`] without any platform hardware.
//! Tests drive it by calling [`MockSensor::emit`], and can inject failures
//! into `start_counting` and `snapshot`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::debug;

use stride_types::{RawSensorEvent, SensorSnapshot};

use crate::error::{Error, Result};
use crate::sensor::{DEFAULT_SENSOR_BUFFER, SensorReceiver, SensorSender, StepSensor, sensor_channel};

/// A mock step sensor.
pub struct MockSensor {
    name: String,
    available: bool,
    counting: AtomicBool,
    steps: AtomicU64,
    date: RwLock<Date>,
    subscribers: Mutex<Vec<SensorSender>>,
    buffer: usize,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Number of operations still to fail before succeeding.
    remaining_failures: AtomicU32,
    start_count: AtomicU32,
    stop_count: AtomicU32,
}

impl std::fmt::Debug for MockSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSensor")
            .field("name", &self.name)
            .field("counting", &self.counting.load(Ordering::Relaxed))
            .field("steps", &self.steps.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSensor {
    /// Create a mock sensor at zero steps dated today (UTC).
    pub fn new() -> Self {
        MockSensorBuilder::new().build()
    }

    /// Create a builder.
    pub fn builder() -> MockSensorBuilder {
        MockSensorBuilder::new()
    }

    /// Whether counting is active.
    pub fn is_counting(&self) -> bool {
        self.counting.load(Ordering::Relaxed)
    }

    /// Current raw counter value.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Times `start_counting` succeeded.
    pub fn start_count(&self) -> u32 {
        self.start_count.load(Ordering::Relaxed)
    }

    /// Times `stop_counting` was called.
    pub fn stop_count(&self) -> u32 {
        self.stop_count.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Set the counter to `steps` and push it to every subscriber.
    ///
    /// Returns how many subscribers received the event.
    pub async fn emit(&self, steps: u64) -> usize {
        let date = *self.date.read().await;
        self.emit_event(RawSensorEvent::new(steps, date)).await
    }

    /// Push a reading stamped with `date`, moving the sensor to that date.
    pub async fn emit_on(&self, steps: u64, date: Date) -> usize {
        *self.date.write().await = date;
        self.emit_event(RawSensorEvent::new(steps, date)).await
    }

    async fn emit_event(&self, event: RawSensorEvent) -> usize {
        self.steps.store(event.steps, Ordering::Relaxed);

        let senders: Vec<SensorSender> = match self.subscribers.lock() {
            Ok(mut subs) => {
                subs.retain(|s| !s.is_closed());
                subs.clone()
            }
            Err(_) => Vec::new(),
        };

        let mut delivered = 0;
        for sender in senders {
            if sender.send(event).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// End every open subscription without stopping the sensor.
    pub fn close_subscribers(&self) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.clear();
        }
    }

    /// Make the sensor fail until cleared.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Fail the next `count` operations, then recover.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    async fn check_should_fail(&self) -> Result<()> {
        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::Sensor(self.fail_message.read().await.clone()));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            Err(Error::Sensor(self.fail_message.read().await.clone()))
        } else {
            Ok(())
        }
    }

    fn check_counting(&self) -> Result<()> {
        if self.counting.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::NotCounting)
        }
    }
}

#[async_trait]
impl StepSensor for MockSensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_counting(&self) -> Result<()> {
        if !self.available {
            return Err(Error::SensorUnavailable(self.name.clone()));
        }
        self.check_should_fail().await?;

        self.counting.store(true, Ordering::Relaxed);
        self.start_count.fetch_add(1, Ordering::Relaxed);
        debug!("{} started counting", self.name);
        Ok(())
    }

    async fn stop_counting(&self) -> Result<()> {
        self.counting.store(false, Ordering::Relaxed);
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        self.close_subscribers();
        Ok(())
    }

    async fn snapshot(&self) -> Result<SensorSnapshot> {
        self.check_counting()?;
        self.check_should_fail().await?;
        Ok(SensorSnapshot {
            steps: self.steps.load(Ordering::Relaxed),
            date: *self.date.read().await,
        })
    }

    async fn subscribe(&self) -> Result<SensorReceiver> {
        self.check_counting()?;
        let (tx, rx) = sensor_channel(self.buffer);
        self.subscribers
            .lock()
            .map_err(|_| Error::sensor("subscriber list poisoned"))?
            .push(tx);
        Ok(rx)
    }
}

/// Builder for [`MockSensor`].
#[derive(Debug, Clone)]
pub struct MockSensorBuilder {
    name: String,
    steps: u64,
    date: Option<Date>,
    available: bool,
    auto_start: bool,
    buffer: usize,
}

impl Default for MockSensorBuilder {
    fn default() -> Self {
        Self {
            name: "Mock step counter".to_string(),
            steps: 0,
            date: None,
            available: true,
            auto_start: false,
            buffer: DEFAULT_SENSOR_BUFFER,
        }
    }
}

impl MockSensorBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sensor name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the initial counter value.
    #[must_use]
    pub fn steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    /// Set the date stamped on readings.
    #[must_use]
    pub fn date(mut self, date: Date) -> Self {
        self.date = Some(date);
        self
    }

    /// Simulate a device without a step counter.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Start out already counting.
    #[must_use]
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Set the subscription channel capacity.
    #[must_use]
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Build the mock sensor.
    #[must_use]
    pub fn build(self) -> MockSensor {
        MockSensor {
            name: self.name,
            available: self.available,
            counting: AtomicBool::new(self.auto_start && self.available),
            steps: AtomicU64::new(self.steps),
            date: RwLock::new(self.date.unwrap_or_else(|| OffsetDateTime::now_utc().date())),
            subscribers: Mutex::new(Vec::new()),
            buffer: self.buffer,
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock sensor failure".to_string()),
            remaining_failures: AtomicU32::new(0),
            start_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[tokio::test]
    async fn test_start_and_stop() {
        let sensor = MockSensor::new();
        assert!(!sensor.is_counting());

        sensor.start_counting().await.unwrap();
        assert!(sensor.is_counting());
        assert_eq!(sensor.start_count(), 1);

        sensor.stop_counting().await.unwrap();
        assert!(!sensor.is_counting());
        assert_eq!(sensor.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_requires_counting() {
        let sensor = MockSensor::builder().steps(42).build();
        assert!(matches!(sensor.snapshot().await, Err(Error::NotCounting)));

        sensor.start_counting().await.unwrap();
        assert_eq!(sensor.snapshot().await.unwrap().steps, 42);
    }

    #[tokio::test]
    async fn test_unavailable_sensor() {
        let sensor = MockSensor::builder().unavailable().build();
        assert!(matches!(
            sensor.start_counting().await,
            Err(Error::SensorUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers_in_order() {
        let sensor = MockSensor::builder()
            .date(date!(2024 - 01 - 01))
            .auto_start(true)
            .build();
        let mut rx = sensor.subscribe().await.unwrap();

        for steps in [10, 20, 5] {
            assert_eq!(sensor.emit(steps).await, 1);
        }

        let received: Vec<u64> = vec![
            rx.recv().await.unwrap().steps,
            rx.recv().await.unwrap().steps,
            rx.recv().await.unwrap().steps,
        ];
        assert_eq!(received, vec![10, 20, 5]);
    }

    #[tokio::test]
    async fn test_emit_on_changes_date() {
        let sensor = MockSensor::builder()
            .date(date!(2024 - 01 - 01))
            .auto_start(true)
            .build();
        let mut rx = sensor.subscribe().await.unwrap();

        sensor.emit_on(7, date!(2024 - 01 - 02)).await;
        assert_eq!(rx.recv().await.unwrap().date, date!(2024 - 01 - 02));
        assert_eq!(sensor.snapshot().await.unwrap().date, date!(2024 - 01 - 02));
    }

    #[tokio::test]
    async fn test_stop_ends_subscriptions() {
        let sensor = MockSensor::builder().auto_start(true).build();
        let mut rx = sensor.subscribe().await.unwrap();

        sensor.stop_counting().await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let sensor = MockSensor::builder().auto_start(true).build();
        let rx = sensor.subscribe().await.unwrap();
        drop(rx);

        assert_eq!(sensor.emit(1).await, 0);
        assert_eq!(sensor.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures() {
        let sensor = MockSensor::new();
        sensor.set_transient_failures(2);

        assert!(sensor.start_counting().await.is_err());
        assert!(sensor.start_counting().await.is_err());
        assert!(sensor.start_counting().await.is_ok());
    }

    #[tokio::test]
    async fn test_should_fail_message() {
        let sensor = MockSensor::builder().auto_start(true).build();
        sensor.set_should_fail(true, Some("counter offline")).await;

        let err = sensor.snapshot().await.unwrap_err();
        assert!(err.to_string().contains("counter offline"));
    }

    #[tokio::test]
    async fn test_through_trait_object() {
        let sensor: std::sync::Arc<dyn StepSensor> =
            std::sync::Arc::new(MockSensor::builder().steps(9).auto_start(true).build());
        assert_eq!(sensor.snapshot().await.unwrap().steps, 9);
        assert_eq!(sensor.name(), "Mock step counter");
    }
}
