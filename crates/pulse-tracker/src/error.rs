//! Error types for tracker construction.

use thiserror::Error;

/// Errors that can occur while building a tracker.
///
/// Tracking itself never fails with an error: rejected, paused or unstorable
/// events yield `None` from [`crate::Tracker::track`] and are logged.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The database could not be opened or migrated.
    #[error("database error: {0}")]
    Database(#[from] pulse_db::DbError),

    /// The event store failed.
    #[error("event store error: {0}")]
    Store(#[from] pulse_store::StoreError),

    /// The collector endpoint is unusable.
    #[error("transport error: {0}")]
    Transport(#[from] pulse_emitter::TransportError),

    /// The emitter could not be started.
    #[error("emitter error: {0}")]
    Emitter(#[from] pulse_emitter::EmitterError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
