//! Shared types for the pulse event-tracking pipeline.
//!
//! This crate holds the vocabulary every other pulse crate speaks: the
//! [`Event`] tagged union handed to a tracker, the [`SelfDescribingJson`]
//! shape used for context entities and self-describing event bodies, the flat
//! wire-ready [`Payload`], the schema URIs and wire keys, the
//! [`SettingsStore`] contract for namespaced durable settings, and the
//! tracker-scoped [`EventBus`] for cross-cutting notifications.
//!
//! No pulse crate depends on anything except `pulse-types` for cross-cutting
//! type definitions, which keeps the dependency graph acyclic.

mod entity;
mod event;
mod notify;
mod payload;
pub mod schemas;
mod settings;

pub use entity::SelfDescribingJson;
pub use event::{Event, EventError, EventKind, PageView, PrimitiveEvent, Structured};
pub use notify::{EventBus, Notification};
pub use payload::Payload;
pub use settings::{MemorySettingsStore, SettingsError, SettingsStore, LEGACY_NAMESPACE};

/// Tracker version reported in every built event.
pub const TRACKER_VERSION: &str = concat!("pulse-rs-", env!("CARGO_PKG_VERSION"));

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
