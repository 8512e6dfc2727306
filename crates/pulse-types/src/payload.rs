//! The flat, wire-ready record built for each tracked event.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A built event: string keys to string values.
///
/// Empty values are never stored, so absence of a key always means "not
/// known" rather than "known to be empty".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: BTreeMap<String, String>,
}

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, ignoring empty strings. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        if value.is_empty() {
            return None;
        }
        self.fields.insert(key.into(), value)
    }

    /// Inserts `value` when it is `Some`.
    pub fn insert_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.insert(key, v);
        }
    }

    /// Inserts a JSON value, either as plain text under `plain_key` or
    /// URL-safe base64 under `encoded_key`.
    pub fn insert_json(&mut self, value: &Value, base64: bool, encoded_key: &str, plain_key: &str) {
        let text = value.to_string();
        if base64 {
            self.insert(encoded_key, URL_SAFE_NO_PAD.encode(text.as_bytes()));
        } else {
            self.insert(plain_key, text);
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the payload has no keys.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes to a JSON object string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }

    /// Parses a JSON object string produced by [`Payload::to_json`].
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Size of the serialized JSON form in bytes.
    pub fn byte_size(&self) -> usize {
        self.to_json().map_or(0, |s| s.len())
    }
}

impl FromIterator<(String, String)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut payload = Self::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}
