//! Queue events and the observer seam the dispatcher reports through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Something that happened to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    #[serde(rename_all = "camelCase")]
    UnitQueued { unit_id: String, name: String },

    #[serde(rename_all = "camelCase")]
    UnitStarted { unit_id: String, name: String },

    #[serde(rename_all = "camelCase")]
    UnitCompleted {
        unit_id: String,
        name: String,
        records: usize,
    },

    #[serde(rename_all = "camelCase")]
    UnitFailed {
        unit_id: String,
        name: String,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    DrainFinished { processed: usize },
}

/// Event with the time it was emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: QueueEvent,
}

/// Receives dispatcher notifications.
///
/// Called with no locks held. Every method defaults to doing nothing.
pub trait QueueObserver: Send + Sync {
    fn on_unit_queued(&self, _unit_id: &str, _name: &str) {}

    fn on_unit_started(&self, _unit_id: &str, _name: &str) {}

    fn on_unit_completed(&self, _unit_id: &str, _name: &str, _records: usize) {}

    fn on_unit_failed(&self, _unit_id: &str, _name: &str, _error: &str) {}

    fn on_drain_finished(&self, _processed: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl QueueObserver for NoopObserver {}

/// Fans queue events out to any number of subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<TimedEvent>>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(TimedEvent {
            timestamp: Utc::now(),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl QueueObserver for EventBroadcaster {
    fn on_unit_queued(&self, unit_id: &str, name: &str) {
        self.send(QueueEvent::UnitQueued {
            unit_id: unit_id.to_string(),
            name: name.to_string(),
        });
    }

    fn on_unit_started(&self, unit_id: &str, name: &str) {
        self.send(QueueEvent::UnitStarted {
            unit_id: unit_id.to_string(),
            name: name.to_string(),
        });
    }

    fn on_unit_completed(&self, unit_id: &str, name: &str, records: usize) {
        self.send(QueueEvent::UnitCompleted {
            unit_id: unit_id.to_string(),
            name: name.to_string(),
            records,
        });
    }

    fn on_unit_failed(&self, unit_id: &str, name: &str, error: &str) {
        self.send(QueueEvent::UnitFailed {
            unit_id: unit_id.to_string(),
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    fn on_drain_finished(&self, processed: usize) {
        self.send(QueueEvent::DrainFinished { processed });
    }
}
