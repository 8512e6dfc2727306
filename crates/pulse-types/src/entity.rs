//! Self-describing JSON: a schema URI paired with free-form data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A schema URI plus key-value data.
///
/// Used both for context entities attached to events and for the body of
/// self-describing events. Several entities on one event may share a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfDescribingJson {
    /// The schema URI describing `data`.
    pub schema: String,
    /// The entity's fields.
    pub data: Map<String, Value>,
}

impl SelfDescribingJson {
    /// Creates a new self-describing value.
    pub fn new(schema: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            schema: schema.into(),
            data,
        }
    }

    /// Creates a self-describing value from a JSON value, keeping it only if
    /// it is an object.
    pub fn from_value(schema: impl Into<String>, data: Value) -> Option<Self> {
        match data {
            Value::Object(map) => Some(Self::new(schema, map)),
            _ => None,
        }
    }

    /// Returns a string field from `data`, if present.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Returns the `{"schema": ..., "data": ...}` JSON form.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "schema": self.schema,
            "data": Value::Object(self.data.clone()),
        })
    }
}
