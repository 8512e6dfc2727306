//! Session tracking for pulse.
//!
//! A session groups the events a user generates between idle periods. The
//! [`Session`] component owns the persisted record and decides, lazily on
//! each tracked event, whether the idle timeout has elapsed and a new
//! session must begin. [`SessionStateMachine`] plugs it into the state
//! manager so every event carries a client-session entity.
//!
//! Session fields are written to the namespaced [`pulse_types::SettingsStore`]
//! after every mutation, so a relaunch resumes the index and identifiers.

mod machine;
mod record;
mod session;

pub use machine::{SessionState, SessionStateMachine};
pub use record::{SessionRecord, SESSION_KEY};
pub use session::{LifecycleSignal, Session, SessionConfig, ANONYMOUS_USER_ID};
