//! Error types for event store operations.

/// Errors that can occur while reading or mutating an event store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("event store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A pooled connection could not be checked out.
    #[error("event store connection error: {0}")]
    Connection(#[from] r2d2::Error),

    /// Opening or migrating the database failed.
    #[error("event store open error: {0}")]
    Open(#[from] pulse_db::DbError),

    /// A stored payload could not be (de)serialized.
    #[error("event store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the operation.
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}
