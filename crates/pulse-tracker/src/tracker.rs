//! Tracker orchestration: enrichment, filtering and queueing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pulse_db::SqliteSettingsStore;
use pulse_emitter::{Emitter, EmitterConfig, HttpTransport, Transport};
use pulse_session::{Session, SessionConfig, SessionStateMachine};
use pulse_state::{
    DeepLinkStateMachine, InspectableEvent, LifecycleStateMachine, StateMachine, StateManager,
};
use pulse_store::{EventStore, SqliteEventStore};
use pulse_types::{now_millis, Event, EventBus, Notification, SettingsStore};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::gdpr::GdprContext;
use crate::payload::build_payload;
use crate::platform::{
    PlatformContext, PlatformContextStateMachine, PropertySource, RefreshWindows,
};
use crate::subject::Subject;

/// Settings-store key of the install record.
pub const INSTALL_KEY: &str = "install";

/// Identity and enrichment switches of one tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub namespace: String,
    pub app_id: String,
    pub platform: String,
    /// Base64-encode contexts and self-describing bodies.
    pub base64_encoding: bool,
    pub session_context: bool,
    /// Only takes effect when a property source is supplied.
    pub platform_context: bool,
    pub lifecycle_autotracking: bool,
    pub deep_link_context: bool,
    pub install_autotracking: bool,
    pub user_anonymisation: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            app_id: String::new(),
            platform: "mob".to_string(),
            base64_encoding: true,
            session_context: true,
            platform_context: false,
            lifecycle_autotracking: true,
            deep_link_context: true,
            install_autotracking: true,
            user_anonymisation: false,
        }
    }
}

/// The collaborators a tracker is wired to.
pub struct TrackerComponents {
    pub store: Arc<dyn EventStore>,
    pub transport: Arc<dyn Transport>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub property_source: Option<Arc<dyn PropertySource>>,
}

struct Core {
    state: StateManager,
    subject: Option<Subject>,
    gdpr: Option<GdprContext>,
}

/// Enriches events and queues them for delivery.
///
/// Every call to [`Tracker::track`] runs under one lock, so events are
/// enriched and stored in submission order and state transitions never
/// interleave. Network delivery happens on the emitter's own task.
pub struct Tracker {
    settings: TrackerSettings,
    store: Arc<dyn EventStore>,
    emitter: Emitter,
    session: Option<Arc<Session>>,
    bus: EventBus,
    tracking: AtomicBool,
    core: Mutex<Core>,
}

impl Tracker {
    /// Builds a tracker, starts its emitter and, when enabled and not yet
    /// done for this namespace, tracks the install event.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Emitter` when called outside a tokio runtime.
    pub fn new(
        settings: TrackerSettings,
        session_config: SessionConfig,
        emitter_config: EmitterConfig,
        components: TrackerComponents,
    ) -> Result<Self, TrackerError> {
        let bus = EventBus::default();
        let emitter = Emitter::new(
            Arc::clone(&components.store),
            components.transport,
            emitter_config,
            bus.clone(),
        );

        let mut state = StateManager::new();
        let session = if settings.session_context {
            let session = Arc::new(Session::new(
                settings.namespace.clone(),
                session_config,
                Arc::clone(&components.settings_store),
                bus.clone(),
            ));
            session.set_user_anonymisation(settings.user_anonymisation);
            state.add(SessionStateMachine::new(Arc::clone(&session)));
            Some(session)
        } else {
            None
        };
        if settings.lifecycle_autotracking {
            state.add(LifecycleStateMachine);
        }
        if settings.deep_link_context {
            state.add(DeepLinkStateMachine);
        }
        match (settings.platform_context, components.property_source) {
            (true, Some(source)) => state.add(PlatformContextStateMachine::new(
                PlatformContext::new(source, RefreshWindows::default()),
            )),
            (true, None) => tracing::warn!(
                namespace = settings.namespace.as_str(),
                "platform context enabled without a property source"
            ),
            (false, _) => {}
        }

        let tracker = Self {
            settings,
            store: components.store,
            emitter,
            session,
            bus,
            tracking: AtomicBool::new(true),
            core: Mutex::new(Core {
                state,
                subject: None,
                gdpr: None,
            }),
        };
        tracker.emitter.start()?;
        tracing::info!(
            namespace = tracker.settings.namespace.as_str(),
            app_id = tracker.settings.app_id.as_str(),
            "tracker created"
        );

        if tracker.settings.install_autotracking {
            tracker.track_install_once(components.settings_store.as_ref());
        }
        Ok(tracker)
    }

    /// Builds a tracker backed by the on-disk SQLite database and the HTTP
    /// collector named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if the database cannot be opened, the endpoint
    /// is invalid, or no tokio runtime is running.
    pub fn from_config(
        config: &TrackerConfig,
        property_source: Option<Arc<dyn PropertySource>>,
    ) -> Result<Self, TrackerError> {
        let pool = pulse_db::open_database(&config.store.path, config.db_settings())?;
        let transport = HttpTransport::new(
            config.emitter.endpoint.as_str(),
            config.emitter.method,
            Duration::from_secs(config.emitter.request_timeout_secs),
        )?;

        Self::new(
            config.tracker_settings(),
            config.session_config(),
            config.emitter_config(),
            TrackerComponents {
                store: Arc::new(SqliteEventStore::new(pool.clone())),
                transport: Arc::new(transport),
                settings_store: Arc::new(SqliteSettingsStore::new(pool)),
                property_source,
            },
        )
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enriches `event`, stores it and returns its id.
    ///
    /// Returns `None` when tracking is paused, a state machine filter
    /// rejects the event, or the store cannot write it.
    pub fn track(&self, event: impl Into<Event>) -> Option<Uuid> {
        let event = event.into();
        if !self.tracking.load(Ordering::SeqCst) {
            tracing::debug!(namespace = self.namespace(), "tracking paused, event dropped");
            return None;
        }

        let id = event.id.unwrap_or_else(Uuid::new_v4);
        let mut core = self.lock();
        let inspectable = Arc::new(InspectableEvent::new(&event, id, now_millis()));
        let snapshot = core.state.snapshot(&inspectable);

        let mut fields = inspectable.payload.clone();
        core.state.add_payload_values(&inspectable, &snapshot, &mut fields);
        let mut entities = inspectable.entities.clone();
        if let Some(gdpr) = &core.gdpr {
            entities.push(gdpr.entity());
        }
        entities.extend(core.state.entities(&inspectable, &snapshot));

        if !core.state.filter(&inspectable, &snapshot) {
            drop(core);
            tracing::debug!(event_id = %id, "event filtered out");
            self.bus.publish(Notification::EventFiltered { event_id: id });
            return None;
        }

        let payload = build_payload(
            &self.settings,
            core.subject.as_ref(),
            &inspectable,
            &fields,
            &entities,
        );
        if let Err(e) = self.store.insert(&payload) {
            drop(core);
            tracing::error!(event_id = %id, error = %e, "failed to store event");
            self.bus.publish(Notification::Diagnostic {
                source: "tracker".to_string(),
                message: format!("failed to store event {id}: {e}"),
            });
            return None;
        }
        core.state.after_track(&inspectable);
        drop(core);

        self.emitter.flush();
        self.bus.publish(Notification::EventTracked { event_id: id });
        Some(id)
    }

    /// Tracks a message from an external bridge. Malformed messages are
    /// logged and discarded.
    pub fn track_bridged(&self, message: &Value) -> Option<Uuid> {
        match Event::from_bridge(message) {
            Ok(event) => self.track(event),
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed bridged event");
                None
            }
        }
    }

    fn track_install_once(&self, settings: &dyn SettingsStore) {
        let namespace = self.namespace();
        if let Err(e) = settings.migrate(INSTALL_KEY, namespace, &Some::<Value>) {
            tracing::warn!(namespace, error = %e, "legacy install record migration failed");
        }
        match settings.get(namespace, INSTALL_KEY) {
            Ok(Some(_)) => {
                tracing::debug!(namespace, "install already recorded");
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    namespace,
                    error = %e,
                    "failed to read install record, skipping install event"
                );
                return;
            }
        }

        let timestamp_ms = now_millis();
        let record = json!({ "timestamp_ms": timestamp_ms });
        if let Err(e) = settings.set(namespace, INSTALL_KEY, &record) {
            tracing::warn!(namespace, error = %e, "failed to record install, skipping install event");
            return;
        }
        if self
            .track(Event::application_install().with_true_timestamp(timestamp_ms))
            .is_some()
        {
            tracing::info!(namespace, timestamp_ms, "tracked install event");
            self.bus.publish(Notification::Install { timestamp_ms });
        }
    }

    pub fn namespace(&self) -> &str {
        &self.settings.namespace
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Subscribes to this tracker's notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// The session component, when session context is enabled.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Forces the next event to begin a new session.
    pub fn start_new_session(&self) {
        if let Some(session) = &self.session {
            session.start_new_session();
        }
    }

    pub fn set_user_anonymisation(&self, enabled: bool) {
        if let Some(session) = &self.session {
            session.set_user_anonymisation(enabled);
        }
    }

    /// Stops accepting events. Events already stored are still delivered.
    pub fn pause_event_tracking(&self) {
        if self.tracking.swap(false, Ordering::SeqCst) {
            tracing::info!(namespace = self.namespace(), "event tracking paused");
        }
    }

    pub fn resume_event_tracking(&self) {
        if !self.tracking.swap(true, Ordering::SeqCst) {
            tracing::info!(namespace = self.namespace(), "event tracking resumed");
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    pub fn set_subject(&self, subject: Option<Subject>) {
        self.lock().subject = subject;
    }

    pub fn subject(&self) -> Option<Subject> {
        self.lock().subject.clone()
    }

    /// Attaches `context` to every event from now on.
    pub fn enable_gdpr_context(&self, context: GdprContext) {
        self.lock().gdpr = Some(context);
    }

    pub fn disable_gdpr_context(&self) {
        self.lock().gdpr = None;
    }

    pub fn gdpr_context(&self) -> Option<GdprContext> {
        self.lock().gdpr.clone()
    }

    /// Registers `machine`. A machine with the same identifier is replaced;
    /// its state survives only if the replacement has the same type.
    pub fn add_state_machine<M: StateMachine>(&self, machine: M) {
        self.lock().state.add(machine);
    }

    /// Unregisters a machine and discards its state.
    pub fn remove_state_machine(&self, identifier: &str) -> bool {
        self.lock().state.remove(identifier)
    }

    /// Stops the emitter's drain loop. Stored events stay queued.
    pub fn shutdown(&self) {
        self.emitter.shutdown();
        tracing::info!(namespace = self.namespace(), "tracker shut down");
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("settings", &self.settings)
            .field("tracking", &self.is_tracking())
            .field("emitter", &self.emitter)
            .finish_non_exhaustive()
    }
}
