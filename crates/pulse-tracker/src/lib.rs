//! Event tracking orchestration for pulse.
//!
//! A [`Tracker`] takes application events, runs them through the state
//! machines registered with it (session, lifecycle, deep link, platform and
//! any custom ones), flattens the result into a wire [`pulse_types::Payload`]
//! with [`build_payload`], and appends it to the event store. Its
//! [`pulse_emitter::Emitter`] delivers stored events in the background.
//!
//! Configuration is read from TOML by [`load_config`]; [`Tracker::from_config`]
//! wires the SQLite store and HTTP transport it describes.

pub mod config;
mod error;
mod gdpr;
mod payload;
mod platform;
mod registry;
mod subject;
mod tracker;

pub use config::{load_config, ConfigError, TrackerConfig};
pub use error::TrackerError;
pub use gdpr::{Basis, GdprContext};
pub use payload::{build_payload, truncate_url_scheme, MAX_URL_SCHEME_LEN};
pub use platform::{
    PlatformContext, PlatformContextStateMachine, PlatformProperty, PropertySource,
    RefreshWindows,
};
pub use registry::TrackerRegistry;
pub use subject::Subject;
pub use tracker::{Tracker, TrackerComponents, TrackerSettings, INSTALL_KEY};
