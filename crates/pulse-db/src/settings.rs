//! SQLite-backed [`SettingsStore`].

use pulse_types::{SettingsError, SettingsStore, LEGACY_NAMESPACE};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::DbPool;

/// Settings persisted in the `settings` table.
#[derive(Debug, Clone)]
pub struct SqliteSettingsStore {
    pool: DbPool,
}

impl SqliteSettingsStore {
    /// Wraps a pool whose database has been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, SettingsError> {
        self.pool
            .get()
            .map_err(|e| SettingsError::Backend(format!("pool connection error: {e}")))
    }
}

fn backend(e: rusqlite::Error) -> SettingsError {
    SettingsError::Backend(e.to_string())
}

fn read(conn: &Connection, namespace: &str, key: &str) -> Result<Option<Value>, SettingsError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend)?;
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(SettingsError::from)
}

fn write(conn: &Connection, namespace: &str, key: &str, value: &Value) -> Result<(), SettingsError> {
    let json = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings (namespace, key, value_json) VALUES (?1, ?2, ?3)
         ON CONFLICT(namespace, key) DO UPDATE SET
            value_json = excluded.value_json,
            updated_at = datetime('now')",
        params![namespace, key, json],
    )
    .map_err(backend)?;
    Ok(())
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, SettingsError> {
        let conn = self.conn()?;
        read(&conn, namespace, key)
    }

    fn set(&self, namespace: &str, key: &str, value: &Value) -> Result<(), SettingsError> {
        let conn = self.conn()?;
        write(&conn, namespace, key, value)
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<(), SettingsError> {
        self.conn()?
            .execute(
                "DELETE FROM settings WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn migrate(
        &self,
        key: &str,
        namespace: &str,
        transform: &dyn Fn(Value) -> Option<Value>,
    ) -> Result<bool, SettingsError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(backend)?;

        if read(&tx, namespace, key)?.is_some() {
            return Ok(false);
        }
        let Some(old) = read(&tx, LEGACY_NAMESPACE, key)? else {
            return Ok(false);
        };
        let Some(migrated) = transform(old) else {
            return Ok(false);
        };

        write(&tx, namespace, key, &migrated)?;
        tx.execute(
            "DELETE FROM settings WHERE namespace = ?1 AND key = ?2",
            params![LEGACY_NAMESPACE, key],
        )
        .map_err(backend)?;
        tx.commit().map_err(backend)?;

        tracing::info!(namespace, key, "migrated legacy settings record");
        Ok(true)
    }
}
