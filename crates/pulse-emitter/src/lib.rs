//! Event delivery for pulse.
//!
//! The [`Emitter`] drains a [`pulse_store::EventStore`] through an injected
//! [`Transport`]. Delivery is at-least-once: rows are removed only after a
//! confirmed outcome, and a store that cannot remove delivered rows pauses
//! the emitter rather than risk sending them again and again.
//!
//! # Retry rules
//!
//! | Outcome | Rows |
//! |---------|------|
//! | 2xx | removed |
//! | oversize request | removed |
//! | retry disabled, or status not retryable | removed |
//! | any other failure | kept for the next cycle |
//!
//! A status is retryable unless it is one of
//! [`DEFAULT_NO_RETRY_STATUS_CODES`]; entries in
//! `custom_retry_for_status_codes` override that for the codes they name.

mod config;
mod emitter;
mod request;
mod retry;
mod transport;

pub use config::{BufferOption, EmitterConfig, HttpMethod, MIN_EMIT_INTERVAL};
pub use emitter::{CycleReport, Emitter, EmitterError, EmitterStatus};
pub use request::{
    build_requests, Request, RequestResult, POST_WRAPPER_BYTES, SEPARATOR_BYTES, STM_BYTES,
};
pub use retry::{Disposition, RetryPolicy, DEFAULT_NO_RETRY_STATUS_CODES};
pub use transport::{HttpTransport, Transport, TransportError};
