//! `pulse-flush`: drains a pulse event database to its collector.
//!
//! Loads configuration, opens the on-disk event store, delivers everything
//! that can be delivered with the HTTP transport, and reports how many rows
//! are left.

use std::sync::Arc;
use std::time::Duration;

use pulse_emitter::{CycleReport, Emitter, HttpTransport};
use pulse_store::{EventStore, SqliteEventStore};
use pulse_tracker::load_config;
use pulse_types::EventBus;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PULSE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("pulse.toml"));

    let config = load_config(selected_config_path)
        .expect("failed to load configuration, check the file passed to pulse-flush");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let store = Arc::new(
        SqliteEventStore::open(&config.store.path, config.db_settings())
            .expect("failed to open event store, check store.path in config"),
    );
    let transport = HttpTransport::new(
        config.emitter.endpoint.as_str(),
        config.emitter.method,
        Duration::from_secs(config.emitter.request_timeout_secs),
    )
    .expect("invalid collector endpoint, check emitter.endpoint in config");

    let pending = store.count().expect("failed to count stored events");
    tracing::info!(pending, endpoint = config.emitter.endpoint.as_str(), "flushing event store");

    // The blocking HTTP client must be created and dropped outside async
    // context, so the runtime only wraps the drain itself.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let emitter = Emitter::new(
        Arc::clone(&store) as Arc<dyn EventStore>,
        Arc::new(transport),
        config.emitter_config(),
        EventBus::default(),
    );

    let mut total = CycleReport::default();
    loop {
        let report = runtime.block_on(emitter.drain());
        total.attempted += report.attempted;
        total.sent += report.sent;
        total.dropped += report.dropped;
        total.retained += report.retained;
        if report.attempted == 0 || report.retained > 0 {
            break;
        }
    }
    drop(emitter);
    drop(runtime);

    let remaining = store.count().expect("failed to count stored events");
    tracing::info!(
        sent = total.sent,
        dropped = total.dropped,
        retained = total.retained,
        remaining,
        "flush finished"
    );
    println!(
        "sent {} dropped {} retained {}; {} rows remain",
        total.sent, total.dropped, total.retained, remaining
    );
}
