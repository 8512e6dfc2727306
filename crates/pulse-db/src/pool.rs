//! Pooled SQLite connections for the event queue and settings.
//!
//! The tracker appends rows on the caller's thread while the emitter reads
//! and deletes them from blocking tasks, so every connection runs in WAL
//! mode with a busy timeout long enough to ride out the other side's write.

use std::time::Duration;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Connection tunables, taken from the `[store]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on open connections. Zero is treated as one.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 4,
        }
    }
}

impl DbRuntimeSettings {
    fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Applies the queue pragmas to every connection the pool opens.
#[derive(Debug)]
struct QueuePragmas {
    busy_timeout: Duration,
}

impl CustomizeConnection<Connection, rusqlite::Error> for QueuePragmas {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        // In-memory databases answer "memory" and stay that way.
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if mode != "wal" && mode != "memory" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("event queue needs WAL journal mode, got {mode}")),
            ));
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")
    }
}

/// Builds a pool for the database at `db_path`.
///
/// [`IN_MEMORY`] gets a single connection, because every SQLite memory
/// connection is its own database and rows written through one would be
/// invisible to the others.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the first connection cannot be opened
/// or configured.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let (manager, max_size) = if db_path == IN_MEMORY {
        (SqliteConnectionManager::memory(), 1)
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        (
            SqliteConnectionManager::file(db_path).with_flags(flags),
            settings.pool_max_size.max(1),
        )
    };

    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(settings.busy_timeout().max(Duration::from_secs(1)))
        .connection_customizer(Box::new(QueuePragmas {
            busy_timeout: settings.busy_timeout(),
        }))
        .build(manager)?;

    tracing::debug!(path = db_path, max_size, "opened sqlite pool");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma<T: rusqlite::types::FromSql>(pool: &DbPool, name: &str) -> T {
        let conn = pool.get().expect("connection");
        conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))
            .expect("pragma query")
    }

    #[test]
    fn file_queue_runs_in_wal_with_configured_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.db");
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(path.to_str().expect("utf-8 path"), settings).expect("pool");

        assert_eq!(pragma::<String>(&pool, "journal_mode"), "wal");
        assert_eq!(pragma::<i64>(&pool, "busy_timeout"), 2_500);
        // NORMAL
        assert_eq!(pragma::<i64>(&pool, "synchronous"), 1);
        assert_eq!(pool.max_size(), 3);
    }

    #[test]
    fn zero_pool_size_still_opens_one_connection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.db");
        let settings = DbRuntimeSettings {
            pool_max_size: 0,
            ..DbRuntimeSettings::default()
        };

        let pool = create_pool(path.to_str().expect("utf-8 path"), settings).expect("pool");
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn memory_database_is_shared_through_one_connection() {
        let pool = create_pool(IN_MEMORY, DbRuntimeSettings::default()).expect("pool");
        assert_eq!(pool.max_size(), 1);

        pool.get()
            .expect("connection")
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
            .expect("write");
        let x: i64 = pool
            .get()
            .expect("connection")
            .query_row("SELECT x FROM t", [], |row| row.get(0))
            .expect("read back");
        assert_eq!(x, 7);
    }
}
