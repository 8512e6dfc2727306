//! The session component: timeout evaluation, counters, persistence.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pulse_types::{EventBus, Notification, SettingsStore};
use uuid::Uuid;

use crate::machine::SessionState;
use crate::record::{migrate_legacy, SessionRecord, SESSION_KEY};

/// User id reported while user anonymisation is enabled.
pub const ANONYMOUS_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

/// Session timeouts and reporting options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle time after which a foregrounded app starts a new session.
    pub foreground_timeout: Duration,
    /// Idle time after which a backgrounded app starts a new session.
    pub background_timeout: Duration,
    /// Reported in the session entity as `storageMechanism`.
    pub storage_mechanism: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            foreground_timeout: DEFAULT_TIMEOUT,
            background_timeout: DEFAULT_TIMEOUT,
            storage_mechanism: "SQLITE".to_string(),
        }
    }
}

/// An explicit foreground/background transition carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The application moved to the foreground.
    Foreground,
    /// The application moved to the background.
    Background,
}

struct Inner {
    record: SessionRecord,
    /// Device timestamp of the last event seen in this process.
    last_access_ms: Option<i64>,
    in_background: bool,
    force_new: bool,
    anonymise: bool,
}

/// Owns the session record for one tracker namespace.
///
/// All mutation happens under an internal lock. Timeouts are evaluated
/// lazily when [`Session::update`] is called with the next event's
/// timestamp; nothing ticks in the background.
pub struct Session {
    namespace: String,
    config: SessionConfig,
    settings: Arc<dyn SettingsStore>,
    bus: EventBus,
    inner: Mutex<Inner>,
}

impl Session {
    /// Loads (or creates) the session record for `namespace`.
    ///
    /// A legacy record is migrated into the namespaced layout first. The
    /// first event after construction always starts a new session.
    pub fn new(
        namespace: impl Into<String>,
        config: SessionConfig,
        settings: Arc<dyn SettingsStore>,
        bus: EventBus,
    ) -> Self {
        let namespace = namespace.into();

        match settings.migrate(SESSION_KEY, &namespace, &migrate_legacy) {
            Ok(true) => tracing::info!(namespace, "migrated legacy session record"),
            Ok(false) => tracing::debug!(namespace, "no legacy session record to migrate"),
            Err(e) => tracing::warn!(namespace, error = %e, "legacy session migration failed"),
        }

        let record = match settings.get(&namespace, SESSION_KEY) {
            Ok(Some(value)) => match serde_json::from_value::<SessionRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(namespace, error = %e, "discarding unreadable session record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "failed to read session record");
                None
            }
        };

        let session = Self {
            namespace,
            config,
            settings,
            bus,
            inner: Mutex::new(Inner {
                record: SessionRecord::fresh(),
                last_access_ms: None,
                in_background: false,
                force_new: false,
                anonymise: false,
            }),
        };

        match record {
            Some(record) => session.lock().record = record,
            None => session.persist(&session.lock().record),
        }
        session
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, record: &SessionRecord) {
        let value = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(namespace = self.namespace, error = %e, "failed to encode session record");
                return;
            }
        };
        if let Err(e) = self.settings.set(&self.namespace, SESSION_KEY, &value) {
            tracing::warn!(namespace = self.namespace, error = %e, "failed to persist session record");
        }
    }

    /// Records an event and returns the session state it belongs to.
    ///
    /// A new session starts when this is the first event since launch,
    /// when a new session was requested, or when the time since the last
    /// event reaches the timeout for the state the app was in (foreground
    /// or background). Otherwise the event index advances.
    pub fn update(
        &self,
        event_id: Uuid,
        timestamp_ms: i64,
        signal: Option<LifecycleSignal>,
    ) -> SessionState {
        let mut inner = self.lock();

        let timeout = if inner.in_background {
            self.config.background_timeout
        } else {
            self.config.foreground_timeout
        };
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let expired = inner
            .last_access_ms
            .map_or(true, |last| timestamp_ms.saturating_sub(last) >= timeout_ms);

        let started = if inner.force_new || expired {
            Some(start_session(&mut inner, event_id, timestamp_ms))
        } else {
            inner.record.event_index = inner.record.event_index.saturating_add(1);
            None
        };

        match signal {
            Some(LifecycleSignal::Foreground) => {
                inner.in_background = false;
                inner.record.foreground_index = inner.record.foreground_index.saturating_add(1);
            }
            Some(LifecycleSignal::Background) => {
                inner.in_background = true;
                inner.record.background_index = inner.record.background_index.saturating_add(1);
            }
            None => {}
        }
        inner.last_access_ms = Some(timestamp_ms);

        self.persist(&inner.record);
        let state = SessionState::new(&inner.record, &self.config.storage_mechanism);
        drop(inner);

        if let Some(notification) = started {
            if let Notification::SessionStarted { session_index, .. } = &notification {
                tracing::info!(namespace = self.namespace, session_index, "started new session");
            }
            self.bus.publish(notification);
        }
        state
    }

    /// Forces the next event to start a new session.
    pub fn start_new_session(&self) {
        self.lock().force_new = true;
    }

    /// Enables or disables user anonymisation in emitted session entities.
    pub fn set_user_anonymisation(&self, enabled: bool) {
        self.lock().anonymise = enabled;
    }

    /// Returns `true` while user anonymisation is enabled.
    pub fn user_anonymisation(&self) -> bool {
        self.lock().anonymise
    }

    /// Returns `true` if the last lifecycle signal was a background one.
    pub fn is_in_background(&self) -> bool {
        self.lock().in_background
    }

    /// A copy of the current record.
    pub fn record(&self) -> SessionRecord {
        self.lock().record.clone()
    }

    /// The namespace this session is persisted under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn start_session(inner: &mut Inner, event_id: Uuid, timestamp_ms: i64) -> Notification {
    let record = &mut inner.record;
    let previous = std::mem::replace(&mut record.session_id, Uuid::new_v4().to_string());
    record.previous_session_id = Some(previous).filter(|id| !id.is_empty());
    record.session_index = record.session_index.saturating_add(1);
    record.first_event_id = Some(event_id.to_string());
    record.first_event_timestamp_ms = Some(timestamp_ms);
    record.event_index = 1;
    inner.force_new = false;

    Notification::SessionStarted {
        session_id: record.session_id.clone(),
        session_index: record.session_index,
        previous_session_id: record.previous_session_id.clone(),
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
