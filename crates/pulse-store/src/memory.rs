//! In-memory event store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use pulse_types::{now_millis, Payload};

use crate::{age_cutoff, EventStore, EvictionPolicy, StoreError, StoredEvent};

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    /// id -> (payload, inserted_at_ms). Ordered by id, which is insertion order.
    rows: BTreeMap<i64, (Payload, i64)>,
}

/// Rows kept in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: Mutex<Rows>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Rows> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends `payload` as if it had been inserted at `inserted_at_ms`.
    pub fn insert_at(&self, payload: &Payload, inserted_at_ms: i64) -> i64 {
        let mut rows = self.rows();
        rows.next_id += 1;
        let id = rows.next_id;
        rows.rows.insert(id, (payload.clone(), inserted_at_ms));
        id
    }
}

impl EventStore for MemoryEventStore {
    fn insert(&self, payload: &Payload) -> Result<i64, StoreError> {
        Ok(self.insert_at(payload, now_millis()))
    }

    fn emittable(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        Ok(self
            .rows()
            .rows
            .iter()
            .take(limit)
            .map(|(id, (payload, _))| StoredEvent {
                id: *id,
                payload: payload.clone(),
            })
            .collect())
    }

    fn remove(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let mut rows = self.rows();
        Ok(ids.iter().filter(|id| rows.rows.remove(*id).is_some()).count())
    }

    fn remove_all(&self) -> Result<usize, StoreError> {
        let mut rows = self.rows();
        let removed = rows.rows.len();
        rows.rows.clear();
        Ok(removed)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows().rows.len())
    }

    fn remove_old(&self, policy: EvictionPolicy) -> Result<usize, StoreError> {
        let mut rows = self.rows();
        let before = rows.rows.len();

        if let Some(max_age) = policy.max_age {
            let cutoff = age_cutoff(now_millis(), max_age);
            rows.rows.retain(|_, (_, inserted_at)| *inserted_at >= cutoff);
        }
        if let Some(max_rows) = policy.max_rows {
            while rows.rows.len() > max_rows {
                rows.rows.pop_first();
            }
        }

        Ok(before - rows.rows.len())
    }
}
