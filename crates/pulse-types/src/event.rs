//! The trackable event model.
//!
//! An [`Event`] is a tagged union over the three kinds of occurrence the
//! pipeline accepts, plus the fields every kind carries: an optional
//! caller-assigned id, an optional true timestamp, and attached entities.
//! Kinds are matched exhaustively when the tracker ingests the event.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::entity::SelfDescribingJson;
use crate::schemas::{self, keys, names};

/// Errors raised when external input cannot be turned into an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The bridged message is not a JSON object.
    #[error("bridged event must be a JSON object")]
    NotAnObject,

    /// The bridged message has no usable schema.
    #[error("bridged event is missing a non-empty schema")]
    MissingSchema,

    /// The bridged data is absent or not an object.
    #[error("bridged event data must be a JSON object")]
    InvalidData,

    /// An attached entity is malformed.
    #[error("bridged entity at index {index} is malformed")]
    InvalidEntity {
        /// Position of the offending entity.
        index: usize,
    },

    /// The true timestamp is not an integer.
    #[error("bridged true timestamp must be an integer number of milliseconds")]
    InvalidTimestamp,
}

/// A structured event: category and action plus optional label, property,
/// and numeric value.
#[derive(Debug, Clone, PartialEq)]
pub struct Structured {
    /// Event category.
    pub category: String,
    /// Event action.
    pub action: String,
    /// Optional label.
    pub label: Option<String>,
    /// Optional property.
    pub property: Option<String>,
    /// Optional numeric value.
    pub value: Option<f64>,
}

impl Structured {
    /// Creates a structured event with the required fields.
    pub fn new(category: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            label: None,
            property: None,
            value: None,
        }
    }

    /// Sets the label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the property.
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Sets the numeric value.
    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

/// A page view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    /// Page URL.
    pub url: String,
    /// Optional page title.
    pub title: Option<String>,
    /// Optional referrer URL.
    pub referrer: Option<String>,
}

impl PageView {
    /// Creates a page view for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            referrer: None,
        }
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the referrer.
    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// Events with a fixed name and field set.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveEvent {
    /// See [`Structured`].
    Structured(Structured),
    /// See [`PageView`].
    PageView(PageView),
}

impl PrimitiveEvent {
    /// Returns the event name written to the `e` key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Structured(_) => names::STRUCTURED,
            Self::PageView(_) => names::PAGE_VIEW,
        }
    }

    /// Returns the event's wire fields.
    pub fn fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), Value::String(v));
            }
        };
        match self {
            Self::Structured(se) => {
                put(keys::SE_CATEGORY, Some(se.category.clone()));
                put(keys::SE_ACTION, Some(se.action.clone()));
                put(keys::SE_LABEL, se.label.clone());
                put(keys::SE_PROPERTY, se.property.clone());
                put(keys::SE_VALUE, se.value.map(|v| v.to_string()));
            }
            Self::PageView(pv) => {
                put(keys::PAGE_URL, Some(pv.url.clone()));
                put(keys::PAGE_TITLE, pv.title.clone());
                put(keys::PAGE_REFERRER, pv.referrer.clone());
            }
        }
        map
    }
}

/// The kind of a trackable occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A primitive named event.
    Primitive(PrimitiveEvent),
    /// A self-describing event created by the host application.
    SelfDescribing(SelfDescribingJson),
    /// A self-describing event whose schema and data came from an external
    /// bridge and were validated by [`Event::from_bridge`].
    External(SelfDescribingJson),
}

/// A trackable occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Caller-assigned id. The tracker generates one when absent.
    pub id: Option<Uuid>,
    /// What happened.
    pub kind: EventKind,
    /// Client-assigned true timestamp in milliseconds.
    pub true_timestamp: Option<i64>,
    /// Entities supplied with the event.
    pub entities: Vec<SelfDescribingJson>,
}

impl Event {
    /// Creates an event of the given kind.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: None,
            kind,
            true_timestamp: None,
            entities: Vec::new(),
        }
    }

    /// Creates a self-describing event.
    pub fn self_describing(body: SelfDescribingJson) -> Self {
        Self::new(EventKind::SelfDescribing(body))
    }

    /// Application moved to the foreground, `index` times so far.
    pub fn foreground(index: u32) -> Self {
        Self::builtin(schemas::APPLICATION_FOREGROUND, [("foregroundIndex", index.into())])
    }

    /// Application moved to the background, `index` times so far.
    pub fn background(index: u32) -> Self {
        Self::builtin(schemas::APPLICATION_BACKGROUND, [("backgroundIndex", index.into())])
    }

    /// A screen named `name` was shown.
    pub fn screen_view(name: impl Into<String>, id: Uuid) -> Self {
        Self::builtin(
            schemas::SCREEN_VIEW,
            [
                ("name", Value::String(name.into())),
                ("id", Value::String(id.to_string())),
            ],
        )
    }

    /// A screen view that also records the kind of screen (e.g. `"modal"`).
    pub fn typed_screen_view(
        name: impl Into<String>,
        id: Uuid,
        screen_type: impl Into<String>,
    ) -> Self {
        Self::builtin(
            schemas::SCREEN_VIEW,
            [
                ("name", Value::String(name.into())),
                ("id", Value::String(id.to_string())),
                ("type", Value::String(screen_type.into())),
            ],
        )
    }

    /// The application was opened through `url`.
    pub fn deep_link_received(url: impl Into<String>, referrer: Option<String>) -> Self {
        let mut data = Map::new();
        data.insert("url".to_string(), Value::String(url.into()));
        if let Some(r) = referrer {
            data.insert("referrer".to_string(), Value::String(r));
        }
        Self::self_describing(SelfDescribingJson::new(schemas::DEEP_LINK_RECEIVED, data))
    }

    /// The application was installed.
    pub fn application_install() -> Self {
        Self::self_describing(SelfDescribingJson::new(schemas::APPLICATION_INSTALL, Map::new()))
    }

    fn builtin<const N: usize>(schema: &str, fields: [(&str, Value); N]) -> Self {
        let data = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self::self_describing(SelfDescribingJson::new(schema, data))
    }

    /// Sets the event id.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the true timestamp in milliseconds.
    pub fn with_true_timestamp(mut self, millis: i64) -> Self {
        self.true_timestamp = Some(millis);
        self
    }

    /// Attaches one entity.
    pub fn with_entity(mut self, entity: SelfDescribingJson) -> Self {
        self.entities.push(entity);
        self
    }

    /// Returns the schema of a self-describing or external event.
    pub fn schema(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Primitive(_) => None,
            EventKind::SelfDescribing(body) | EventKind::External(body) => Some(&body.schema),
        }
    }

    /// Returns the value of the `e` key.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            EventKind::Primitive(p) => p.name(),
            EventKind::SelfDescribing(_) | EventKind::External(_) => names::SELF_DESCRIBING,
        }
    }

    /// Returns the identifier state machines subscribe to: the schema for
    /// self-describing events, the event name otherwise.
    pub fn identifier(&self) -> &str {
        self.schema().unwrap_or_else(|| self.name())
    }

    /// Returns the event's key-value payload fragment.
    pub fn payload(&self) -> Map<String, Value> {
        match &self.kind {
            EventKind::Primitive(p) => p.fields(),
            EventKind::SelfDescribing(body) | EventKind::External(body) => body.data.clone(),
        }
    }

    /// Validates a message from an external bridge.
    ///
    /// Expected shape: `{"schema": "...", "data": {...}, "entities": [...],
    /// "true_timestamp": 123}` with the last two optional.
    pub fn from_bridge(message: &Value) -> Result<Self, EventError> {
        let obj = message.as_object().ok_or(EventError::NotAnObject)?;

        let schema = obj
            .get("schema")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or(EventError::MissingSchema)?;

        let data = match obj.get("data") {
            Some(Value::Object(map)) => map.clone(),
            _ => return Err(EventError::InvalidData),
        };

        let mut entities = Vec::new();
        if let Some(raw) = obj.get("entities") {
            let list = raw.as_array().ok_or(EventError::InvalidEntity { index: 0 })?;
            for (index, item) in list.iter().enumerate() {
                let schema = item
                    .get("schema")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty());
                match (schema, item.get("data")) {
                    (Some(s), Some(Value::Object(d))) => {
                        entities.push(SelfDescribingJson::new(s, d.clone()));
                    }
                    _ => return Err(EventError::InvalidEntity { index }),
                }
            }
        }

        let true_timestamp = match obj.get("true_timestamp") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_i64().ok_or(EventError::InvalidTimestamp)?),
        };

        Ok(Self {
            id: None,
            kind: EventKind::External(SelfDescribingJson::new(schema, data)),
            true_timestamp,
            entities,
        })
    }
}

impl From<Structured> for Event {
    fn from(se: Structured) -> Self {
        Self::new(EventKind::Primitive(PrimitiveEvent::Structured(se)))
    }
}

impl From<PageView> for Event {
    fn from(pv: PageView) -> Self {
        Self::new(EventKind::Primitive(PrimitiveEvent::PageView(pv)))
    }
}
