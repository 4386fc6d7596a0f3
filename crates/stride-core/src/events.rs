//! Tracker event system.
//!
//! The tracker publishes what it does on a broadcast channel so a display,
//! a log sink or a test can follow along without being in the event loop.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use stride_store::UpsertOutcome;
use stride_types::StepRecord;

use crate::permissions::Permission;

/// Events emitted by a running tracker.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum TrackerEvent {
    /// Counting started; `today` is the restored total.
    Started { today: StepRecord },
    /// Today's total changed (or a new day opened).
    Updated { today: StepRecord, delta: u64 },
    /// The raw counter went backwards and was re-anchored.
    CounterReset { raw: u64, previous: u64 },
    /// A day was finalized.
    DayClosed { record: StepRecord },
    /// The sensor failed; the last known total stays on display.
    SensorFailed { error: String },
    /// A local write failed and was dropped.
    PersistFailed { error: String },
    /// A remote write finished.
    SyncCompleted { key: String, outcome: UpsertOutcome },
    /// A remote write failed and was dropped.
    SyncFailed { key: String, error: String },
    /// The permission gate refused to start.
    PermissionDenied { permission: Permission },
    /// The tracker stopped.
    Stopped { today: StepRecord },
}

/// Sender for tracker events.
pub type EventSender = broadcast::Sender<TrackerEvent>;

/// Receiver for tracker events.
pub type EventReceiver = broadcast::Receiver<TrackerEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: TrackerEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_event_serialization() {
        let event = TrackerEvent::Updated {
            today: StepRecord::new(date!(2024 - 01 - 01), 250),
            delta: 50,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"updated","today":{"date":"2024-01-01","count":250},"delta":50}"#
        );
    }

    #[test]
    fn test_permission_denied_serialization() {
        let event = TrackerEvent::PermissionDenied {
            permission: Permission::BodySensorsBackground,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""permission":"body_sensors_background""#));
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        let event = TrackerEvent::DayClosed {
            record: StepRecord::new(date!(2024 - 01 - 01), 500),
        };
        dispatcher.send(event.clone());

        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(TrackerEvent::SensorFailed {
            error: "gone".to_string(),
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
