//! The persisted session record and the legacy layout it replaces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Settings key the session record is stored under.
pub const SESSION_KEY: &str = "session";

/// Session fields that survive a process restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Install-level user identifier, generated once.
    pub user_id: String,
    /// Current session identifier. Empty until the first session starts.
    #[serde(default)]
    pub session_id: String,
    /// Identifier of the session before this one.
    #[serde(default)]
    pub previous_session_id: Option<String>,
    /// Sequential session counter, starting at 1.
    #[serde(default)]
    pub session_index: u32,
    /// Id of the event that started the current session.
    #[serde(default)]
    pub first_event_id: Option<String>,
    /// Device timestamp of that event, in milliseconds.
    #[serde(default)]
    pub first_event_timestamp_ms: Option<i64>,
    /// Position of the latest event within the current session.
    #[serde(default)]
    pub event_index: u32,
    /// Number of foreground transitions seen.
    #[serde(default)]
    pub foreground_index: u32,
    /// Number of background transitions seen.
    #[serde(default)]
    pub background_index: u32,
}

impl SessionRecord {
    /// A record for a user who has never had a session.
    pub fn fresh() -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            session_id: String::new(),
            previous_session_id: None,
            session_index: 0,
            first_event_id: None,
            first_event_timestamp_ms: None,
            event_index: 0,
            foreground_index: 0,
            background_index: 0,
        }
    }
}

/// Converts a record written by older releases.
///
/// The legacy layout is a flat camel-case object. The index is carried
/// over, the old identifier becomes both the current and the previous
/// identifier, and the first-event id is regenerated since the old layout
/// never recorded it. Returns `None` if the record lacks a session id.
pub(crate) fn migrate_legacy(old: Value) -> Option<Value> {
    let obj = old.as_object()?;
    let session_id = obj.get("sessionId")?.as_str()?.to_string();
    let session_index = obj
        .get("sessionIndex")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
    let user_id = obj
        .get("userId")
        .and_then(Value::as_str)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let record = SessionRecord {
        user_id,
        previous_session_id: Some(session_id.clone()),
        session_id,
        session_index,
        first_event_id: Some(Uuid::new_v4().to_string()),
        first_event_timestamp_ms: None,
        event_index: 0,
        foreground_index: 0,
        background_index: 0,
    };
    serde_json::to_value(record).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_record_keeps_index_and_identifiers() {
        let old = json!({
            "userId": "user-1",
            "sessionId": "old-session",
            "previousSessionId": "older-session",
            "sessionIndex": 7,
            "storageMechanism": "SQLITE"
        });

        let migrated = migrate_legacy(old).expect("legacy record migrates");
        let record: SessionRecord = serde_json::from_value(migrated).expect("valid record");

        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.session_index, 7);
        assert_eq!(record.session_id, "old-session");
        assert_eq!(record.previous_session_id.as_deref(), Some("old-session"));
        let first = record.first_event_id.expect("first event id regenerated");
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn legacy_record_without_session_id_is_rejected() {
        assert!(migrate_legacy(json!({"sessionIndex": 2})).is_none());
        assert!(migrate_legacy(json!("not an object")).is_none());
    }
}
