//! Application-owned set of trackers keyed by namespace.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::tracker::Tracker;

#[derive(Default)]
struct Entries {
    trackers: BTreeMap<String, Arc<Tracker>>,
    default: Option<String>,
}

/// Holds trackers by namespace. The first tracker inserted becomes the
/// default until another is chosen or it is removed.
#[derive(Default)]
pub struct TrackerRegistry {
    entries: RwLock<Entries>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Builds a tracker from `config` and registers it.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if the tracker cannot be built.
    pub fn create(&self, config: &TrackerConfig) -> Result<Arc<Tracker>, TrackerError> {
        let tracker = Tracker::from_config(config, None)?;
        Ok(self.insert(tracker))
    }

    /// Registers `tracker` under its namespace, shutting down any tracker it
    /// replaces.
    pub fn insert(&self, tracker: Tracker) -> Arc<Tracker> {
        let tracker = Arc::new(tracker);
        let namespace = tracker.namespace().to_string();
        let mut entries = self.write();
        if let Some(previous) = entries.trackers.insert(namespace.clone(), Arc::clone(&tracker)) {
            tracing::info!(namespace = namespace.as_str(), "replacing registered tracker");
            previous.shutdown();
        }
        if entries.default.is_none() {
            entries.default = Some(namespace);
        }
        tracker
    }

    pub fn get(&self, namespace: &str) -> Option<Arc<Tracker>> {
        self.read().trackers.get(namespace).cloned()
    }

    pub fn default_tracker(&self) -> Option<Arc<Tracker>> {
        let entries = self.read();
        let namespace = entries.default.as_deref()?;
        entries.trackers.get(namespace).cloned()
    }

    /// Makes the tracker registered under `namespace` the default. Returns
    /// `false` if there is none.
    pub fn set_default(&self, namespace: &str) -> bool {
        let mut entries = self.write();
        if !entries.trackers.contains_key(namespace) {
            return false;
        }
        entries.default = Some(namespace.to_string());
        true
    }

    /// Unregisters and shuts down the tracker under `namespace`.
    pub fn remove(&self, namespace: &str) -> Option<Arc<Tracker>> {
        let mut entries = self.write();
        let tracker = entries.trackers.remove(namespace)?;
        if entries.default.as_deref() == Some(namespace) {
            entries.default = None;
        }
        drop(entries);
        tracker.shutdown();
        Some(tracker)
    }

    /// Unregisters and shuts down every tracker.
    pub fn remove_all(&self) {
        let trackers = {
            let mut entries = self.write();
            entries.default = None;
            std::mem::take(&mut entries.trackers)
        };
        for tracker in trackers.values() {
            tracker.shutdown();
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.read().trackers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for TrackerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.read();
        f.debug_struct("TrackerRegistry")
            .field("namespaces", &entries.trackers.keys().collect::<Vec<_>>())
            .field("default", &entries.default)
            .finish()
    }
}
