//! Read-only view of an event as it moves through enrichment.

use pulse_types::{Event, SelfDescribingJson};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The fields of a tracked event that state machines may inspect.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectableEvent {
    /// Event id assigned by the caller or the tracker.
    pub id: Uuid,
    /// Value of the `e` key.
    pub name: &'static str,
    /// Schema of a self-describing event.
    pub schema: Option<String>,
    /// The event's key-value payload fragment.
    pub payload: Map<String, Value>,
    /// Device-created timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Client-assigned true timestamp in milliseconds.
    pub true_timestamp: Option<i64>,
    /// Entities supplied with the event.
    pub entities: Vec<SelfDescribingJson>,
}

impl InspectableEvent {
    /// Captures `event` with the id and timestamp the tracker assigned.
    pub fn new(event: &Event, id: Uuid, timestamp_ms: i64) -> Self {
        Self {
            id,
            name: event.name(),
            schema: event.schema().map(str::to_string),
            payload: event.payload(),
            timestamp_ms,
            true_timestamp: event.true_timestamp,
            entities: event.entities.clone(),
        }
    }

    /// The identifier machines subscribe to: schema if present, else name.
    pub fn identifier(&self) -> &str {
        self.schema.as_deref().unwrap_or(self.name)
    }

    /// Returns a string field from the payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}
