//! Registry of state machines and per-event snapshot construction.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use pulse_types::SelfDescribingJson;
use serde_json::{Map, Value};

use crate::event::InspectableEvent;
use crate::future::{StateFuture, TrackerStateSnapshot};
use crate::machine::{State, StateMachine, Subscriptions};

struct Registered {
    identifier: String,
    machine: Arc<dyn StateMachine>,
    kind: TypeId,
    subscriptions: Subscriptions,
}

/// Owns the active state machines and their accumulated state.
///
/// The manager is not internally synchronized. The tracker keeps it behind
/// the same lock that serializes event submission, so transitions are never
/// interleaved.
#[derive(Default)]
pub struct StateManager {
    machines: Vec<Registered>,
    current: HashMap<String, Arc<StateFuture>>,
}

impl StateManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `machine` under its identifier.
    ///
    /// Replacing a machine of the same concrete type keeps the state
    /// accumulated so far; replacing it with a different type resets that
    /// identifier's state to empty.
    pub fn add<M: StateMachine>(&mut self, machine: M) {
        self.add_shared(Arc::new(machine));
    }

    /// Like [`StateManager::add`] for a machine the caller also holds.
    pub fn add_shared<M: StateMachine>(&mut self, machine: Arc<M>) {
        let identifier = machine.identifier().to_string();
        let kind = TypeId::of::<M>();
        let registered = Registered {
            identifier: identifier.clone(),
            subscriptions: machine.subscriptions(),
            machine,
            kind,
        };

        match self.machines.iter().position(|r| r.identifier == identifier) {
            Some(index) => {
                if self.machines[index].kind == kind {
                    tracing::debug!(identifier, "replaced state machine, state kept");
                } else {
                    self.current.remove(&identifier);
                    tracing::debug!(identifier, "replaced state machine with another kind, state reset");
                }
                self.machines[index] = registered;
            }
            None => {
                tracing::debug!(identifier, "registered state machine");
                self.machines.push(registered);
            }
        }
    }

    /// Unregisters the machine and deletes its state. Returns `false` if
    /// nothing was registered under `identifier`.
    pub fn remove(&mut self, identifier: &str) -> bool {
        let before = self.machines.len();
        self.machines.retain(|r| r.identifier != identifier);
        self.current.remove(identifier);
        self.machines.len() != before
    }

    /// Returns `true` if a machine is registered under `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.machines.iter().any(|r| r.identifier == identifier)
    }

    /// Identifiers of registered machines, in registration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.machines.iter().map(|r| r.identifier.as_str())
    }

    /// Latest state of `identifier`, resolving it if needed.
    pub fn state(&self, identifier: &str) -> Option<Arc<dyn State>> {
        self.current.get(identifier).and_then(|f| f.state())
    }

    /// Advances state for `event` and returns the snapshot it must be
    /// enriched against.
    ///
    /// Only machines subscribed to the event's transitions get a new
    /// future; the rest keep their previous one untouched. The new future
    /// stays pending until read, but the one it replaces is resolved here.
    pub fn snapshot(&mut self, event: &Arc<InspectableEvent>) -> TrackerStateSnapshot {
        let identifier = event.identifier();
        for r in &self.machines {
            if !r.subscriptions.transitions.matches(identifier) {
                continue;
            }
            let previous = self.current.get(&r.identifier).cloned();
            // Settle the older link so the chain never holds more than one
            // pending transition per machine.
            if let Some(previous) = previous.as_ref().filter(|f| !f.is_resolved()) {
                let _ = previous.state();
            }
            let future = StateFuture::pending(Arc::clone(event), previous, Arc::clone(&r.machine));
            self.current.insert(r.identifier.clone(), Arc::new(future));
        }
        TrackerStateSnapshot::new(self.current.clone())
    }

    /// Entities contributed by subscribed machines, in registration order.
    pub fn entities(
        &self,
        event: &InspectableEvent,
        snapshot: &TrackerStateSnapshot,
    ) -> Vec<SelfDescribingJson> {
        let identifier = event.identifier();
        let mut entities = Vec::new();
        for r in self
            .machines
            .iter()
            .filter(|r| r.subscriptions.entities.matches(identifier))
        {
            let state = snapshot.state(&r.identifier);
            if let Some(list) = r.machine.entities(event, state.as_deref()) {
                entities.extend(list);
            }
        }
        entities
    }

    /// Merges payload values from subscribed machines into `payload`.
    ///
    /// A key that already exists keeps its original value. Returns `false`
    /// if any value was rejected that way.
    pub fn add_payload_values(
        &self,
        event: &InspectableEvent,
        snapshot: &TrackerStateSnapshot,
        payload: &mut Map<String, Value>,
    ) -> bool {
        let identifier = event.identifier();
        let mut all_added = true;
        for r in self
            .machines
            .iter()
            .filter(|r| r.subscriptions.payload_values.matches(identifier))
        {
            let state = snapshot.state(&r.identifier);
            let Some(values) = r.machine.payload_values(event, state.as_deref()) else {
                continue;
            };
            for (key, value) in values {
                if payload.contains_key(&key) {
                    tracing::warn!(
                        machine = r.identifier.as_str(),
                        key = key.as_str(),
                        "payload value collides with existing key, keeping original"
                    );
                    all_added = false;
                } else {
                    payload.insert(key, value);
                }
            }
        }
        all_added
    }

    /// Logical AND of every vote cast by subscribed machines. Abstentions
    /// are ignored; with no votes the event is accepted.
    pub fn filter(&self, event: &InspectableEvent, snapshot: &TrackerStateSnapshot) -> bool {
        let identifier = event.identifier();
        self.machines
            .iter()
            .filter(|r| r.subscriptions.filter.matches(identifier))
            .all(|r| {
                let state = snapshot.state(&r.identifier);
                match r.machine.filter(event, state.as_deref()) {
                    Some(false) => {
                        tracing::debug!(
                            machine = r.identifier.as_str(),
                            event_id = %event.id,
                            "event rejected by state machine filter"
                        );
                        false
                    }
                    Some(true) | None => true,
                }
            })
    }

    /// Notifies subscribed machines that `event` was queued.
    pub fn after_track(&self, event: &InspectableEvent) {
        let identifier = event.identifier();
        for r in self
            .machines
            .iter()
            .filter(|r| r.subscriptions.after_track.matches(identifier))
        {
            r.machine.after_track(event);
        }
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("machines", &self.identifiers().collect::<Vec<_>>())
            .finish()
    }
}
