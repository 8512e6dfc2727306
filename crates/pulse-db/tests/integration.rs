use pulse_db::{open_database, DbRuntimeSettings, SqliteSettingsStore};
use pulse_types::{SettingsStore, LEGACY_NAMESPACE};
use serde_json::json;

fn open(dir: &tempfile::TempDir) -> pulse_db::DbPool {
    let path = dir.path().join("pulse.db");
    open_database(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to open database")
}

#[test]
fn db_initialization_creates_schema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = open(&dir);
    let conn = pool.get().expect("failed to get connection");

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table query")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(tables, vec!["_pulse_migrations", "events", "settings"]);
}

#[test]
fn settings_survive_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let store = SqliteSettingsStore::new(open(&dir));
        store
            .set("app", "session", &json!({"sessionIndex": 7}))
            .expect("set should succeed");
    }

    let store = SqliteSettingsStore::new(open(&dir));
    assert_eq!(
        store.get("app", "session").expect("get should succeed"),
        Some(json!({"sessionIndex": 7}))
    );
}

#[test]
fn settings_overwrite_and_remove() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteSettingsStore::new(open(&dir));

    store.set("app", "install", &json!(1)).expect("first set");
    store.set("app", "install", &json!(2)).expect("second set");
    assert_eq!(store.get("app", "install").expect("get"), Some(json!(2)));

    store.remove("app", "install").expect("remove");
    store.remove("app", "install").expect("second remove is a no-op");
    assert_eq!(store.get("app", "install").expect("get"), None);
}

#[test]
fn legacy_record_migrates_atomically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteSettingsStore::new(open(&dir));

    store
        .set(LEGACY_NAMESPACE, "session", &json!({"sessionIndex": 3}))
        .expect("seed legacy record");

    let moved = store
        .migrate("session", "app", &|old| {
            let index = old.get("sessionIndex")?.as_u64()?;
            Some(json!({"sessionIndex": index, "migrated": true}))
        })
        .expect("migration should succeed");

    assert!(moved);
    assert_eq!(
        store.get("app", "session").expect("get"),
        Some(json!({"sessionIndex": 3, "migrated": true}))
    );
    assert_eq!(store.get(LEGACY_NAMESPACE, "session").expect("get legacy"), None);
}

#[test]
fn migration_skips_when_transform_rejects_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteSettingsStore::new(open(&dir));

    store
        .set(LEGACY_NAMESPACE, "session", &json!("garbage"))
        .expect("seed legacy record");

    let moved = store
        .migrate("session", "app", &|_| None)
        .expect("migration call should succeed");

    assert!(!moved);
    assert_eq!(
        store.get(LEGACY_NAMESPACE, "session").expect("get legacy"),
        Some(json!("garbage")),
        "legacy record stays untouched"
    );
}
