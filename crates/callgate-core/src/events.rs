//! User-visible notification events
//!
//! Every terminal transition and every approval suspension is announced with
//! exactly one event attached to the tool call it concerns. The recorder is
//! injected into the controller and the callback service; this module ships an
//! in-memory recorder for tests and inspection and one that writes events to
//! the structured log.

use crate::identifiers::ObjectKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => f.write_str("Normal"),
            EventType::Warning => f.write_str("Warning"),
        }
    }
}

/// One recorded notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub involved: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Sink for notification events
pub trait EventRecorder: Send + Sync {
    fn record(&self, involved: &ObjectKey, event_type: EventType, reason: &str, message: &str);
}

/// Recorder that keeps every event in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl InMemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events recorded for one object, oldest first
    pub fn events_for(&self, key: &ObjectKey) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| &event.involved == key)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn record(&self, involved: &ObjectKey, event_type: EventType, reason: &str, message: &str) {
        let event = Event {
            involved: involved.clone(),
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(_) => tracing::warn!(object = %involved, reason, "Event buffer poisoned, dropping event"),
        }
    }
}

/// Recorder that emits events as structured log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, involved: &ObjectKey, event_type: EventType, reason: &str, message: &str) {
        match event_type {
            EventType::Normal => tracing::info!(
                object = %involved,
                event.kind = %event_type,
                event.reason = reason,
                "{message}"
            ),
            EventType::Warning => tracing::warn!(
                object = %involved,
                event.kind = %event_type,
                event.reason = reason,
                "{message}"
            ),
        }
    }
}
