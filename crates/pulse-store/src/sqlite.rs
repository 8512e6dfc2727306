//! SQLite-backed event store.
//!
//! Rows live in the `events` table created by the pulse-db migrations.
//! Payloads are stored as their JSON text, so a row reads back with exactly
//! the keys and values that were inserted.

use pulse_db::{open_database, DbPool, DbRuntimeSettings};
use pulse_types::{now_millis, Payload};
use rusqlite::{params, params_from_iter, Connection};

use crate::{age_cutoff, EventStore, EvictionPolicy, StoreError, StoredEvent};

/// Event rows persisted in a pulse database.
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    pool: DbPool,
}

impl SqliteEventStore {
    /// Wraps a pool whose database has been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens (and migrates) the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Open` if the database cannot be opened.
    pub fn open(db_path: &str, settings: DbRuntimeSettings) -> Result<Self, StoreError> {
        Ok(Self::new(open_database(db_path, settings)?))
    }

    /// The underlying pool, shared with the settings store.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Appends `payload` as if it had been inserted at `inserted_at_ms`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the row cannot be written.
    pub fn insert_at(&self, payload: &Payload, inserted_at_ms: i64) -> Result<i64, StoreError> {
        let json = payload.to_json()?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO events (payload_json, inserted_at_ms) VALUES (?1, ?2)",
            params![json, inserted_at_ms],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, payload: &Payload) -> Result<i64, StoreError> {
        self.insert_at(payload, now_millis())
    }

    fn emittable(&self, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, payload_json FROM events WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;

        let mut events = Vec::new();
        let mut unreadable = Vec::new();
        let mut after = i64::MIN;
        // Unreadable rows do not count toward `limit`; page past them.
        while events.len() < limit {
            let want = limit - events.len();
            let page = stmt
                .query_map(params![after, i64::try_from(want).unwrap_or(i64::MAX)], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let exhausted = page.len() < want;

            for (id, json) in page {
                after = id;
                match Payload::from_json(&json) {
                    Ok(payload) => events.push(StoredEvent { id, payload }),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "deleting unreadable event row");
                        unreadable.push(id);
                    }
                }
            }
            if exhausted {
                break;
            }
        }

        if !unreadable.is_empty() {
            delete_ids(&conn, &unreadable)?;
        }
        Ok(events)
    }

    fn remove(&self, ids: &[i64]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.pool.get()?;
        delete_ids(&conn, ids)
    }

    fn remove_all(&self) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        Ok(conn.execute("DELETE FROM events", [])?)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn remove_old(&self, policy: EvictionPolicy) -> Result<usize, StoreError> {
        if policy.is_unbounded() {
            return Ok(0);
        }
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0;

        if let Some(max_age) = policy.max_age {
            let cutoff = age_cutoff(now_millis(), max_age);
            removed += tx.execute(
                "DELETE FROM events WHERE inserted_at_ms < ?1",
                params![cutoff],
            )?;
        }
        if let Some(max_rows) = policy.max_rows {
            let keep = i64::try_from(max_rows).unwrap_or(i64::MAX);
            removed += tx.execute(
                "DELETE FROM events WHERE id NOT IN (
                    SELECT id FROM events ORDER BY id DESC LIMIT ?1
                 )",
                params![keep],
            )?;
        }

        tx.commit()?;
        if removed > 0 {
            tracing::info!(removed, "evicted old event rows");
        }
        Ok(removed)
    }
}

fn delete_ids(conn: &Connection, ids: &[i64]) -> Result<usize, StoreError> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM events WHERE id IN ({placeholders})");
    Ok(conn.execute(&sql, params_from_iter(ids.iter()))?)
}
