//! Daily step reconciliation for pedometer backends.
//!
//! This crate turns a raw, occasionally resetting step counter into one step
//! total per calendar day, and keeps those totals in a local store and a
//! remote collection without ever double counting or lowering a day.
//!
//! # Features
//!
//! - **Reconciler**: pure day-bucket state machine ([`reconciler`])
//! - **Day clock**: one fixed UTC offset for every day boundary ([`clock`])
//! - **Sensors**: [`StepSensor`] trait with mock and replay implementations
//! - **Permission gate**: all-or-nothing runtime permission requests
//! - **Tracker**: event loop wiring sensor, reconciler and stores together
//! - **Retries**: opt-in backoff for remote writes
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stride_core::{ReplaySensor, StepTracker, TrackerConfig};
//! use stride_store::{StepLog, Store};
//! use time::macros::date;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sensor = ReplaySensor::from_counts([1000, 1050, 1200, 40, 90], date!(2024 - 01 - 01));
//!     let log = StepLog::new(Store::open_default()?);
//!
//!     let mut tracker = StepTracker::new(Arc::new(sensor), log, TrackerConfig::new("user-1"));
//!     let summary = tracker.run(CancellationToken::new()).await?;
//!     println!("Added {} steps", summary.steps_added);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod error;
pub mod events;
pub mod mock;
pub mod permissions;
pub mod reconciler;
pub mod replay;
pub mod retry;
pub mod sensor;
pub mod sync;
pub mod tracker;

pub use clock::{DayClock, FixedOffsetClock, ManualClock, SensorDateClock, format_utc_offset, parse_utc_offset};
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, TrackerEvent};
pub use mock::{MockSensor, MockSensorBuilder};
pub use permissions::{
    GateResult, Permission, PermissionProvider, PermissionStatus, Platform, StaticPermissions,
    check_all, request_all,
};
pub use reconciler::{Effect, ReconcilerState, Transition, on_sensor_event};
pub use replay::ReplaySensor;
pub use retry::{RetryConfig, with_retry};
pub use sensor::{SensorReceiver, SensorSender, StepSensor, sensor_channel};
pub use sync::{SyncReport, pull_history, push_history};
pub use tracker::{StepTracker, TrackerConfig, TrackerSummary};

// Re-export from stride-types
pub use stride_types::{RawSensorEvent, RemoteStepDoc, SensorSnapshot, StepRecord};
