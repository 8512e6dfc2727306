//! Session state exposed to the state manager.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use pulse_state::{InspectableEvent, Selector, State, StateMachine, Subscriptions};
use pulse_types::{schemas, SelfDescribingJson};
use serde_json::{Map, Value};

use crate::record::SessionRecord;
use crate::session::{LifecycleSignal, Session, ANONYMOUS_USER_ID};

/// The session as seen by one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: String,
    pub session_id: String,
    pub previous_session_id: Option<String>,
    pub session_index: u32,
    pub storage_mechanism: String,
    pub first_event_id: Option<String>,
    pub first_event_timestamp_ms: Option<i64>,
    pub event_index: u32,
}

impl SessionState {
    pub(crate) fn new(record: &SessionRecord, storage_mechanism: &str) -> Self {
        Self {
            user_id: record.user_id.clone(),
            session_id: record.session_id.clone(),
            previous_session_id: record.previous_session_id.clone(),
            session_index: record.session_index,
            storage_mechanism: storage_mechanism.to_string(),
            first_event_id: record.first_event_id.clone(),
            first_event_timestamp_ms: record.first_event_timestamp_ms,
            event_index: record.event_index,
        }
    }

    /// Builds the client-session entity.
    ///
    /// With `anonymise` set, the user id is replaced by
    /// [`ANONYMOUS_USER_ID`] and the previous session id is left out.
    pub fn entity(&self, anonymise: bool) -> SelfDescribingJson {
        let mut data = Map::new();
        let user_id = if anonymise {
            ANONYMOUS_USER_ID
        } else {
            self.user_id.as_str()
        };
        data.insert("userId".into(), Value::from(user_id));
        data.insert("sessionId".into(), Value::from(self.session_id.as_str()));
        data.insert("sessionIndex".into(), Value::from(self.session_index));
        if !anonymise {
            if let Some(previous) = &self.previous_session_id {
                data.insert("previousSessionId".into(), Value::from(previous.as_str()));
            }
        }
        data.insert(
            "storageMechanism".into(),
            Value::from(self.storage_mechanism.as_str()),
        );
        if let Some(id) = &self.first_event_id {
            data.insert("firstEventId".into(), Value::from(id.as_str()));
        }
        if let Some(ts) = self
            .first_event_timestamp_ms
            .and_then(DateTime::<Utc>::from_timestamp_millis)
        {
            data.insert(
                "firstEventTimestamp".into(),
                Value::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        data.insert("eventIndex".into(), Value::from(self.event_index));
        SelfDescribingJson::new(schemas::CLIENT_SESSION, data)
    }
}

impl State for SessionState {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Feeds every event through the [`Session`] and attaches the resulting
/// client-session entity.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    session: Arc<Session>,
}

impl SessionStateMachine {
    /// Registration key.
    pub const IDENTIFIER: &'static str = "Session";

    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl StateMachine for SessionStateMachine {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            transitions: Selector::All,
            entities: Selector::All,
            ..Subscriptions::default()
        }
    }

    fn transition(
        &self,
        event: &InspectableEvent,
        _previous: Option<&Arc<dyn State>>,
    ) -> Option<Arc<dyn State>> {
        let signal = match event.schema.as_deref() {
            Some(schemas::APPLICATION_FOREGROUND) => Some(LifecycleSignal::Foreground),
            Some(schemas::APPLICATION_BACKGROUND) => Some(LifecycleSignal::Background),
            _ => None,
        };
        let state = self.session.update(event.id, event.timestamp_ms, signal);
        Some(Arc::new(state))
    }

    fn entities(
        &self,
        _event: &InspectableEvent,
        state: Option<&dyn State>,
    ) -> Option<Vec<SelfDescribingJson>> {
        let state = state?.downcast_ref::<SessionState>()?;
        Some(vec![state.entity(self.session.user_anonymisation())])
    }
}
