//! Namespaced durable settings contract.
//!
//! Small records (session fields, install metadata) live in a key-value store
//! scoped by tracker namespace. Records written by older releases sit in an
//! unkeyed layout, addressed here by [`LEGACY_NAMESPACE`], and are moved into
//! the namespaced layout with [`SettingsStore::migrate`].

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Namespace under which legacy, unkeyed records are stored.
pub const LEGACY_NAMESPACE: &str = "";

/// Errors from a settings backend.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The storage backend failed.
    #[error("settings backend error: {0}")]
    Backend(String),

    /// A stored record could not be (de)serialized.
    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A key-value store for small records, scoped by namespace.
pub trait SettingsStore: Send + Sync {
    /// Reads the record at `namespace`/`key`.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, SettingsError>;

    /// Writes the record at `namespace`/`key`, replacing any previous value.
    fn set(&self, namespace: &str, key: &str, value: &Value) -> Result<(), SettingsError>;

    /// Deletes the record at `namespace`/`key`. Deleting a missing record is
    /// not an error.
    fn remove(&self, namespace: &str, key: &str) -> Result<(), SettingsError>;

    /// Atomically moves the legacy record stored under `key` to
    /// `namespace`/`key`, passing it through `transform`.
    ///
    /// Does nothing and returns `false` when the namespaced record already
    /// exists, when there is no legacy record, or when `transform` returns
    /// `None`. On success the legacy record is deleted and `true` returned.
    fn migrate(
        &self,
        key: &str,
        namespace: &str,
        transform: &dyn Fn(Value) -> Option<Value>,
    ) -> Result<bool, SettingsError>;
}

/// Settings kept in process memory. Nothing survives a restart; intended for
/// tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    records: Mutex<HashMap<(String, String), Value>>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Value>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self
            .records()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: &Value) -> Result<(), SettingsError> {
        self.records()
            .insert((namespace.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<(), SettingsError> {
        self.records()
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    fn migrate(
        &self,
        key: &str,
        namespace: &str,
        transform: &dyn Fn(Value) -> Option<Value>,
    ) -> Result<bool, SettingsError> {
        let mut records = self.records();
        let target = (namespace.to_string(), key.to_string());
        if records.contains_key(&target) {
            return Ok(false);
        }
        let legacy = (LEGACY_NAMESPACE.to_string(), key.to_string());
        let Some(old) = records.get(&legacy).cloned() else {
            return Ok(false);
        };
        let Some(migrated) = transform(old) else {
            return Ok(false);
        };
        records.insert(target, migrated);
        records.remove(&legacy);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn namespaces_are_isolated() {
        let store = MemorySettingsStore::new();
        store.set("a", "session", &json!({"n": 1})).expect("set a");
        store.set("b", "session", &json!({"n": 2})).expect("set b");

        assert_eq!(store.get("a", "session").expect("get a"), Some(json!({"n": 1})));
        assert_eq!(store.get("b", "session").expect("get b"), Some(json!({"n": 2})));

        store.remove("a", "session").expect("remove");
        assert_eq!(store.get("a", "session").expect("get a"), None);
    }

    #[test]
    fn migrate_moves_legacy_record_once() {
        let store = MemorySettingsStore::new();
        store
            .set(LEGACY_NAMESPACE, "session", &json!({"index": 4}))
            .expect("seed legacy");

        let moved = store
            .migrate("session", "app", &|v| Some(json!({"migrated": v})))
            .expect("migrate");
        assert!(moved);
        assert_eq!(
            store.get("app", "session").expect("get"),
            Some(json!({"migrated": {"index": 4}}))
        );
        assert_eq!(store.get(LEGACY_NAMESPACE, "session").expect("get legacy"), None);

        let again = store
            .migrate("session", "app", &|v| Some(v))
            .expect("second migrate");
        assert!(!again);
    }
}
