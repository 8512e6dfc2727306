//! Lazily computed state and the per-event snapshot that holds it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::event::InspectableEvent;
use crate::machine::{State, StateMachine};

struct PendingTransition {
    event: Arc<InspectableEvent>,
    previous: Option<Arc<StateFuture>>,
    machine: Arc<dyn StateMachine>,
}

/// State of one machine after one event, computed at most once on first
/// read.
///
/// A pending future holds the event, the machine, and the future for the
/// previous state. Reading it runs the transition against the previous
/// state and releases those references. [`StateManager::snapshot`]
/// resolves a future before chaining a new one onto it, so a pending
/// future's predecessor is always resolved.
///
/// [`StateManager::snapshot`]: crate::StateManager::snapshot
pub struct StateFuture {
    state: OnceLock<Option<Arc<dyn State>>>,
    pending: Mutex<Option<PendingTransition>>,
}

impl StateFuture {
    pub(crate) fn pending(
        event: Arc<InspectableEvent>,
        previous: Option<Arc<StateFuture>>,
        machine: Arc<dyn StateMachine>,
    ) -> Self {
        Self {
            state: OnceLock::new(),
            pending: Mutex::new(Some(PendingTransition {
                event,
                previous,
                machine,
            })),
        }
    }

    /// A future that is already resolved to `state`.
    pub fn ready(state: Option<Arc<dyn State>>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(state);
        Self {
            state: cell,
            pending: Mutex::new(None),
        }
    }

    /// Returns the state, computing it on first call.
    pub fn state(&self) -> Option<Arc<dyn State>> {
        self.state
            .get_or_init(|| {
                let pending = self
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take();
                let Some(p) = pending else {
                    return None;
                };
                let previous = p.previous.as_ref().and_then(|f| f.state());
                p.machine
                    .transition(&p.event, previous.as_ref())
                    .or(previous)
            })
            .clone()
    }

    /// Returns `true` once the state has been computed.
    pub fn is_resolved(&self) -> bool {
        self.state.get().is_some()
    }
}

impl std::fmt::Debug for StateFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateFuture")
            .field("resolved", &self.state.get())
            .finish()
    }
}

/// Immutable view of every machine's state for one event.
#[derive(Debug, Clone, Default)]
pub struct TrackerStateSnapshot {
    states: HashMap<String, Arc<StateFuture>>,
}

impl TrackerStateSnapshot {
    pub(crate) fn new(states: HashMap<String, Arc<StateFuture>>) -> Self {
        Self { states }
    }

    /// State of the machine registered under `identifier`.
    pub fn state(&self, identifier: &str) -> Option<Arc<dyn State>> {
        self.states.get(identifier).and_then(|f| f.state())
    }

    /// The future backing `identifier`, for inspecting laziness.
    pub fn future(&self, identifier: &str) -> Option<&Arc<StateFuture>> {
        self.states.get(identifier)
    }

    /// Identifiers that have state in this snapshot.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}
