//! Step sensor abstraction.
//!
//! The platform step counter lives behind [`StepSensor`]. Implementations
//! push raw counter updates into an mpsc channel, so readings reach the
//! tracker in the order the sensor produced them, decoupled from whatever
//! renders the totals.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use stride_types::{RawSensorEvent, SensorSnapshot};

use crate::error::Result;

/// Channel capacity used by the bundled sensors.
pub const DEFAULT_SENSOR_BUFFER: usize = 64;

/// Receiving half of a sensor subscription.
pub type SensorReceiver = mpsc::Receiver<RawSensorEvent>;

/// Sending half of a sensor subscription.
pub type SensorSender = mpsc::Sender<RawSensorEvent>;

/// Create a sensor channel with the given capacity.
pub fn sensor_channel(capacity: usize) -> (SensorSender, SensorReceiver) {
    mpsc::channel(capacity)
}

/// A source of raw step counter readings.
///
/// # Example
///
/// ```
/// use stride_core::{MockSensor, StepSensor};
///
/// # #[tokio::main]
/// # async fn main() -> stride_core::Result<()> {
/// let sensor = MockSensor::new();
/// sensor.start_counting().await?;
/// let mut events = sensor.subscribe().await?;
///
/// sensor.emit(1200).await;
/// assert_eq!(events.recv().await.map(|e| e.steps), Some(1200));
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait StepSensor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str {
        "step sensor"
    }

    /// Begin counting. Idempotent.
    async fn start_counting(&self) -> Result<()>;

    /// Stop counting and end every open subscription.
    async fn stop_counting(&self) -> Result<()>;

    /// Current raw counter value.
    async fn snapshot(&self) -> Result<SensorSnapshot>;

    /// Subscribe to raw counter updates.
    ///
    /// The receiver yields `None` once the sensor stops.
    async fn subscribe(&self) -> Result<SensorReceiver>;
}

#[async_trait]
impl<S: StepSensor + ?Sized> StepSensor for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn start_counting(&self) -> Result<()> {
        (**self).start_counting().await
    }

    async fn stop_counting(&self) -> Result<()> {
        (**self).stop_counting().await
    }

    async fn snapshot(&self) -> Result<SensorSnapshot> {
        (**self).snapshot().await
    }

    async fn subscribe(&self) -> Result<SensorReceiver> {
        (**self).subscribe().await
    }
}
