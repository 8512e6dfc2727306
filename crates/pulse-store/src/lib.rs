//! Durable, ordered, at-least-once queue of built events.
//!
//! The tracker appends every built [`Payload`]; the emitter reads the oldest
//! rows, sends them, and removes rows by id once the outcome is confirmed.
//! Rows are never mutated after insertion. Both backends implement the same
//! [`EventStore`] contract and are interchangeable:
//!
//! - [`MemoryEventStore`] keeps rows in process memory.
//! - [`SqliteEventStore`] keeps rows in the `events` table of a pulse
//!   database, so undelivered events survive a restart.
//!
//! Eviction by age and row count uses the insertion timestamp stored with
//! every row.

mod error;
mod memory;
mod sqlite;


use std::time::Duration;

use pulse_types::Payload;

pub use error::StoreError;
pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

/// A row read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Monotonic id assigned at insertion.
    pub id: i64,
    /// The built event, exactly as inserted.
    pub payload: Payload,
}

/// Limits applied by [`EventStore::remove_old`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Keep at most this many rows; the oldest go first.
    pub max_rows: Option<usize>,
    /// Drop rows inserted longer ago than this.
    pub max_age: Option<Duration>,
}

impl EvictionPolicy {
    /// Returns `true` if the policy would never remove anything.
    pub fn is_unbounded(&self) -> bool {
        self.max_rows.is_none() && self.max_age.is_none()
    }
}

/// The event queue contract.
///
/// Implementations synchronize internally, so a store can be shared between
/// the tracker (inserts) and the emitter (reads and removals).
pub trait EventStore: Send + Sync {
    /// Appends `payload` and returns its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the row cannot be written.
    fn insert(&self, payload: &Payload) -> Result<i64, StoreError>;

    /// Returns up to `limit` rows, oldest first. Rows whose payload cannot
    /// be decoded are deleted and do not count toward `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the rows cannot be read.
    fn emittable(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError>;

    /// Removes the rows with the given ids and returns how many existed.
    /// Unknown ids are ignored, so repeating a removal is harmless.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the removal could not be performed. Callers
    /// must then assume the rows are still present.
    fn remove(&self, ids: &[i64]) -> Result<usize, StoreError>;

    /// Removes every row and returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the removal could not be performed.
    fn remove_all(&self) -> Result<usize, StoreError>;

    /// Number of rows currently stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the count cannot be read.
    fn count(&self) -> Result<usize, StoreError>;

    /// Evicts rows older than `policy.max_age`, then the oldest rows beyond
    /// `policy.max_rows`. Returns how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the eviction could not be performed.
    fn remove_old(&self, policy: EvictionPolicy) -> Result<usize, StoreError>;
}

/// Cutoff timestamp for `max_age` relative to `now_ms`.
pub(crate) fn age_cutoff(now_ms: i64, max_age: Duration) -> i64 {
    let age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(age_ms)
}
