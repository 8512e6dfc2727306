//! Database layer for pulse.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the SQLite-backed [`SqliteSettingsStore`].
//! The on-disk event store in `pulse-store` shares the same pool and schema.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: embedded in the host application, no external
//!   process. WAL lets the emitter read while the tracker appends.
//! - **`r2d2` connection pool**: bounded connection reuse across the
//!   tracker thread and the emitter's blocking tasks.
//! - **Embedded migrations**: SQL files are compiled in via `include_str!`,
//!   so the schema always ships with the code that depends on it.

mod migrations;
mod pool;
mod settings;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, IN_MEMORY};
pub use settings::SqliteSettingsStore;

/// Errors from opening a migrated database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The pool could not be built.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A connection could not be checked out.
    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),

    /// Migrations failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Creates a pool for `db_path` and applies pending migrations.
///
/// # Errors
///
/// Returns `DbError` if the pool cannot be built or a migration fails.
pub fn open_database(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, DbError> {
    let pool = create_pool(db_path, settings)?;
    let conn = pool.get()?;
    let applied = run_migrations(&conn)?;
    if applied > 0 {
        tracing::info!(count = applied, path = db_path, "applied database migrations");
    }
    Ok(pool)
}
