//! Application lifecycle tracking.

use std::any::Any;
use std::sync::Arc;

use pulse_types::{schemas, SelfDescribingJson};
use serde_json::{Map, Value};

use crate::event::InspectableEvent;
use crate::machine::{Selector, State, StateMachine, Subscriptions};

/// Whether the application is visible, and how many times it has moved to
/// the foreground or background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    /// `true` while in the foreground.
    pub is_visible: bool,
    /// Foreground or background index carried by the transition event.
    pub index: Option<u64>,
}

impl State for LifecycleState {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Attaches an application-lifecycle entity to every event.
#[derive(Debug, Default)]
pub struct LifecycleStateMachine;

impl LifecycleStateMachine {
    /// Registration key.
    pub const IDENTIFIER: &'static str = "Lifecycle";
}

impl StateMachine for LifecycleStateMachine {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            transitions: Selector::only([
                schemas::APPLICATION_FOREGROUND,
                schemas::APPLICATION_BACKGROUND,
            ]),
            entities: Selector::All,
            ..Subscriptions::default()
        }
    }

    fn transition(
        &self,
        event: &InspectableEvent,
        _previous: Option<&Arc<dyn State>>,
    ) -> Option<Arc<dyn State>> {
        let (is_visible, index_key) = match event.schema.as_deref()? {
            schemas::APPLICATION_FOREGROUND => (true, "foregroundIndex"),
            schemas::APPLICATION_BACKGROUND => (false, "backgroundIndex"),
            _ => return None,
        };
        let index = event.payload.get(index_key).and_then(Value::as_u64);
        Some(Arc::new(LifecycleState { is_visible, index }))
    }

    fn entities(
        &self,
        _event: &InspectableEvent,
        state: Option<&dyn State>,
    ) -> Option<Vec<SelfDescribingJson>> {
        // Before the first transition the application is assumed visible.
        let state = state
            .and_then(|s| s.downcast_ref::<LifecycleState>())
            .copied()
            .unwrap_or(LifecycleState {
                is_visible: true,
                index: None,
            });

        let mut data = Map::new();
        data.insert("isVisible".to_string(), Value::Bool(state.is_visible));
        if let Some(index) = state.index {
            data.insert("index".to_string(), Value::from(index));
        }
        Some(vec![SelfDescribingJson::new(schemas::APPLICATION_LIFECYCLE, data)])
    }
}
