//! The state machine contract.

use std::any::Any;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use pulse_types::SelfDescribingJson;
use serde_json::{Map, Value};

use crate::event::InspectableEvent;

/// State produced by a state machine.
///
/// Implementors return `self` from [`State::as_any`] so callers can
/// downcast to the concrete type.
pub trait State: Any + Send + Sync + Debug {
    /// Returns `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;
}

impl<'a> dyn State + 'a {
    /// Downcasts to a concrete state type.
    pub fn downcast_ref<T: State>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Which events a capability applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    /// Not subscribed.
    #[default]
    None,
    /// Every event.
    All,
    /// Events whose identifier (schema or name) is in the set.
    Only(HashSet<String>),
}

impl Selector {
    /// Subscribes to the listed identifiers.
    pub fn only<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(identifiers.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if an event with `identifier` is selected.
    pub fn matches(&self, identifier: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(set) => set.contains(identifier),
        }
    }
}

/// The capabilities a machine subscribes to, captured once at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    /// Events that drive [`StateMachine::transition`].
    pub transitions: Selector,
    /// Events that receive [`StateMachine::entities`].
    pub entities: Selector,
    /// Events that receive [`StateMachine::payload_values`].
    pub payload_values: Selector,
    /// Events passed to [`StateMachine::after_track`].
    pub after_track: Selector,
    /// Events on which [`StateMachine::filter`] votes.
    pub filter: Selector,
}

/// A pluggable unit that derives state, entities, payload values, and
/// accept/reject decisions from tracked events.
///
/// Every method receives the state for this machine from the event's
/// snapshot, after that event's transition (if subscribed) was applied.
pub trait StateMachine: Send + Sync + 'static {
    /// Key under which the machine and its state are registered.
    fn identifier(&self) -> &str;

    /// Capabilities this machine subscribes to.
    fn subscriptions(&self) -> Subscriptions;

    /// Computes the next state. Returning `None` keeps `previous` unchanged.
    fn transition(
        &self,
        _event: &InspectableEvent,
        _previous: Option<&Arc<dyn State>>,
    ) -> Option<Arc<dyn State>> {
        None
    }

    /// Entities to attach to the event.
    fn entities(
        &self,
        _event: &InspectableEvent,
        _state: Option<&dyn State>,
    ) -> Option<Vec<SelfDescribingJson>> {
        None
    }

    /// Values to merge into the event's payload. Keys already present win.
    fn payload_values(
        &self,
        _event: &InspectableEvent,
        _state: Option<&dyn State>,
    ) -> Option<Map<String, Value>> {
        None
    }

    /// Votes on the event. `None` abstains.
    fn filter(&self, _event: &InspectableEvent, _state: Option<&dyn State>) -> Option<bool> {
        None
    }

    /// Called after the event has been queued for delivery.
    fn after_track(&self, _event: &InspectableEvent) {}
}
