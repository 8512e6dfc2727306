//! Carries a received deep link onto the screen view that follows it.

use std::any::Any;
use std::sync::Arc;

use pulse_types::{schemas, SelfDescribingJson};
use serde_json::{Map, Value};

use crate::event::InspectableEvent;
use crate::machine::{Selector, State, StateMachine, Subscriptions};

/// Progress of the most recent deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkState {
    /// Received, waiting for the next screen view.
    Pending {
        /// The link URL.
        url: String,
        /// The referrer, if known.
        referrer: Option<String>,
    },
    /// Attached to the current screen view.
    Ready {
        /// The link URL.
        url: String,
        /// The referrer, if known.
        referrer: Option<String>,
    },
    /// Already reported; nothing to attach.
    Consumed,
}

impl State for DeepLinkState {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Attaches a deep-link entity to the first screen view after a
/// deep-link-received event.
#[derive(Debug, Default)]
pub struct DeepLinkStateMachine;

impl DeepLinkStateMachine {
    /// Registration key.
    pub const IDENTIFIER: &'static str = "DeepLinkContext";
}

impl StateMachine for DeepLinkStateMachine {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            transitions: Selector::only([schemas::DEEP_LINK_RECEIVED, schemas::SCREEN_VIEW]),
            entities: Selector::only([schemas::SCREEN_VIEW]),
            ..Subscriptions::default()
        }
    }

    fn transition(
        &self,
        event: &InspectableEvent,
        previous: Option<&Arc<dyn State>>,
    ) -> Option<Arc<dyn State>> {
        if event.schema.as_deref() == Some(schemas::DEEP_LINK_RECEIVED) {
            let url = event.str_field("url")?.to_string();
            let referrer = event.str_field("referrer").map(str::to_string);
            return Some(Arc::new(DeepLinkState::Pending { url, referrer }));
        }

        let previous = previous.and_then(|s| s.downcast_ref::<DeepLinkState>())?;
        let next = match previous {
            DeepLinkState::Pending { url, referrer } => DeepLinkState::Ready {
                url: url.clone(),
                referrer: referrer.clone(),
            },
            DeepLinkState::Ready { .. } => DeepLinkState::Consumed,
            DeepLinkState::Consumed => return None,
        };
        Some(Arc::new(next))
    }

    fn entities(
        &self,
        _event: &InspectableEvent,
        state: Option<&dyn State>,
    ) -> Option<Vec<SelfDescribingJson>> {
        let DeepLinkState::Ready { url, referrer } = state?.downcast_ref::<DeepLinkState>()? else {
            return None;
        };
        let mut data = Map::new();
        data.insert("url".to_string(), Value::String(url.clone()));
        if let Some(r) = referrer {
            data.insert("referrer".to_string(), Value::String(r.clone()));
        }
        Some(vec![SelfDescribingJson::new(schemas::DEEP_LINK_ENTITY, data)])
    }
}
