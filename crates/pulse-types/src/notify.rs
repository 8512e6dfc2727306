//! Tracker-scoped notification bus.
//!
//! Cross-cutting signals (install, new session, delivery outcomes, emitter
//! pauses) are published on a broadcast channel owned by one tracker instead
//! of a process-wide listener registry.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Default number of buffered notifications per subscriber.
const DEFAULT_BUS_CAPACITY: usize = 256;

/// A signal published by a tracker or its emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The install event was tracked for this namespace.
    Install {
        /// Install timestamp in milliseconds.
        timestamp_ms: i64,
    },
    /// A new session began.
    SessionStarted {
        /// Identifier of the new session.
        session_id: String,
        /// Sequential index of the new session.
        session_index: u32,
        /// Identifier of the session it replaced, if any.
        previous_session_id: Option<String>,
    },
    /// An event passed enrichment and was queued.
    EventTracked {
        /// The event id.
        event_id: Uuid,
    },
    /// An event was rejected by a state-machine filter.
    EventFiltered {
        /// The event id.
        event_id: Uuid,
    },
    /// A drain cycle finished.
    RequestsCompleted {
        /// Rows delivered successfully.
        sent: usize,
        /// Rows whose request failed (retained or dropped).
        failed: usize,
    },
    /// The emitter stopped scheduling drain cycles.
    EmitterPaused {
        /// Why it paused.
        reason: String,
    },
    /// A diagnostic message from an internal component.
    Diagnostic {
        /// Component that raised it.
        source: String,
        /// Human-readable message.
        message: String,
    },
}

/// Broadcast channel for [`Notification`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` notifications per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a notification. Having no subscribers is not an error.
    pub fn publish(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("notification dropped, no subscribers");
        }
    }

    /// Subscribes to notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
