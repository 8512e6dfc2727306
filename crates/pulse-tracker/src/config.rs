//! Tracker configuration loading from file and environment variables.

use std::collections::HashMap;
use std::time::Duration;

use pulse_db::DbRuntimeSettings;
use pulse_emitter::{BufferOption, EmitterConfig, HttpMethod};
use pulse_session::SessionConfig;
use pulse_store::EvictionPolicy;
use serde::Deserialize;
use thiserror::Error;

use crate::tracker::TrackerSettings;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    /// Identity and enrichment switches.
    #[serde(default)]
    pub tracker: TrackerSection,

    /// Session timeouts.
    #[serde(default)]
    pub session: SessionSection,

    /// Delivery settings.
    #[serde(default)]
    pub emitter: EmitterSection,

    /// Event store settings.
    #[serde(default)]
    pub store: StoreSection,

    /// Logging settings (used by the binary).
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[tracker]`
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSection {
    /// Namespace the tracker and its persisted records are keyed by.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Application identifier reported as `aid`.
    #[serde(default)]
    pub app_id: String,

    /// Platform code reported as `p`.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Encode contexts and self-describing bodies as URL-safe base64.
    #[serde(default = "default_true")]
    pub base64_encoding: bool,

    /// Attach the client-session entity.
    #[serde(default = "default_true")]
    pub session_context: bool,

    /// Attach the platform entity (needs a property source).
    #[serde(default)]
    pub platform_context: bool,

    /// Attach the application-lifecycle entity.
    #[serde(default = "default_true")]
    pub lifecycle_autotracking: bool,

    /// Carry deep links onto the following screen view.
    #[serde(default = "default_true")]
    pub deep_link_context: bool,

    /// Track an install event once per namespace.
    #[serde(default = "default_true")]
    pub install_autotracking: bool,

    /// Hide user identifiers in the session entity.
    #[serde(default)]
    pub user_anonymisation: bool,
}

/// `[session]`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_session_timeout")]
    pub foreground_timeout_secs: u64,

    #[serde(default = "default_session_timeout")]
    pub background_timeout_secs: u64,
}

/// `[emitter]`
#[derive(Debug, Clone, Deserialize)]
pub struct EmitterSection {
    /// Collector base URL, e.g. `https://collector.example.com`.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub buffer_option: BufferOption,

    #[serde(default = "default_emit_range")]
    pub emit_range: usize,

    #[serde(default = "default_byte_limit")]
    pub byte_limit_get: usize,

    #[serde(default = "default_byte_limit")]
    pub byte_limit_post: usize,

    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,

    #[serde(default = "default_true")]
    pub retry_failed_requests: bool,

    /// Status code (as a string key) to retry decision.
    #[serde(default)]
    pub custom_retry_for_status_codes: HashMap<String, bool>,

    #[serde(default = "default_emit_interval_ms")]
    pub emit_interval_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// `[store]`
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Keep at most this many undelivered events.
    #[serde(default)]
    pub max_rows: Option<usize>,

    /// Drop undelivered events older than this.
    #[serde(default)]
    pub max_age_secs: Option<u64>,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// `[logging]`
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "pulse_emitter=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_platform() -> String {
    "mob".to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_timeout() -> u64 {
    1800
}

fn default_emit_range() -> usize {
    150
}

fn default_byte_limit() -> usize {
    40_000
}

fn default_thread_pool_size() -> usize {
    15
}

fn default_emit_interval_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_db_path() -> String {
    "pulse.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            app_id: String::new(),
            platform: default_platform(),
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

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            foreground_timeout_secs: default_session_timeout(),
            background_timeout_secs: default_session_timeout(),
        }
    }
}

impl Default for EmitterSection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            method: HttpMethod::default(),
            buffer_option: BufferOption::default(),
            emit_range: default_emit_range(),
            byte_limit_get: default_byte_limit(),
            byte_limit_post: default_byte_limit(),
            thread_pool_size: default_thread_pool_size(),
            retry_failed_requests: true,
            custom_retry_for_status_codes: HashMap::new(),
            emit_interval_ms: default_emit_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_rows: None,
            max_age_secs: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl TrackerConfig {
    /// Tracker-level settings.
    pub fn tracker_settings(&self) -> TrackerSettings {
        let t = &self.tracker;
        TrackerSettings {
            namespace: t.namespace.clone(),
            app_id: t.app_id.clone(),
            platform: t.platform.clone(),
            base64_encoding: t.base64_encoding,
            session_context: t.session_context,
            platform_context: t.platform_context,
            lifecycle_autotracking: t.lifecycle_autotracking,
            deep_link_context: t.deep_link_context,
            install_autotracking: t.install_autotracking,
            user_anonymisation: t.user_anonymisation,
        }
    }

    /// Session timeouts.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            foreground_timeout: Duration::from_secs(self.session.foreground_timeout_secs),
            background_timeout: Duration::from_secs(self.session.background_timeout_secs),
            ..SessionConfig::default()
        }
    }

    /// Emitter settings. Retry overrides whose key is not a status code are
    /// skipped with a warning, and zero ranges or intervals are raised to
    /// their minimum.
    pub fn emitter_config(&self) -> EmitterConfig {
        let e = &self.emitter;
        let mut overrides = HashMap::new();
        for (code, retry) in &e.custom_retry_for_status_codes {
            match code.trim().parse::<u16>() {
                Ok(code) => {
                    overrides.insert(code, *retry);
                }
                Err(_) => tracing::warn!(key = code.as_str(), "ignoring non-numeric retry override"),
            }
        }

        EmitterConfig {
            buffer: e.buffer_option,
            emit_range: e.emit_range,
            byte_limit_get: e.byte_limit_get,
            byte_limit_post: e.byte_limit_post,
            thread_pool_size: e.thread_pool_size,
            retry_failed_requests: e.retry_failed_requests,
            custom_retry_for_status_codes: overrides,
            emit_interval: Duration::from_millis(e.emit_interval_ms),
            eviction: EvictionPolicy {
                max_rows: self.store.max_rows,
                max_age: self.store.max_age_secs.map(Duration::from_secs),
            },
        }
        .normalized()
    }

    /// SQLite connection settings.
    pub fn db_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.store.busy_timeout_ms,
            pool_max_size: self.store.pool_max_size,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PULSE_NAMESPACE` overrides `tracker.namespace`
/// - `PULSE_APP_ID` overrides `tracker.app_id`
/// - `PULSE_ENDPOINT` overrides `emitter.endpoint`
/// - `PULSE_DB_PATH` overrides `store.path`
/// - `PULSE_LOG_LEVEL` overrides `logging.level`
/// - `PULSE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<TrackerConfig, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                TrackerConfig::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => TrackerConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut TrackerConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(namespace) = var("PULSE_NAMESPACE") {
        config.tracker.namespace = namespace;
    }
    if let Some(app_id) = var("PULSE_APP_ID") {
        config.tracker.app_id = app_id;
    }
    if let Some(endpoint) = var("PULSE_ENDPOINT") {
        config.emitter.endpoint = endpoint;
    }
    if let Some(db_path) = var("PULSE_DB_PATH") {
        config.store.path = db_path;
    }
    if let Some(level) = var("PULSE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("PULSE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
