//! Emitter tunables.

use std::collections::HashMap;
use std::time::Duration;

use pulse_store::EvictionPolicy;
use serde::Deserialize;

/// How many rows a POST request may carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferOption {
    /// One row per request.
    #[default]
    Single,
    /// Up to 10 rows per request.
    SmallGroup,
    /// Up to 25 rows per request.
    LargeGroup,
}

impl BufferOption {
    /// Maximum rows per POST request.
    pub fn size(self) -> usize {
        match self {
            Self::Single => 1,
            Self::SmallGroup => 10,
            Self::LargeGroup => 25,
        }
    }
}

/// Request style used by a transport. GET requests always carry one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

/// Configuration for an [`crate::Emitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterConfig {
    /// Batch-size hint for POST requests.
    pub buffer: BufferOption,
    /// Maximum rows pulled from the store per drain cycle.
    pub emit_range: usize,
    /// Byte ceiling for one GET request.
    pub byte_limit_get: usize,
    /// Byte ceiling for one POST request.
    pub byte_limit_post: usize,
    /// Maximum requests in flight at once.
    pub thread_pool_size: usize,
    /// When `false`, failed rows are dropped instead of retried.
    pub retry_failed_requests: bool,
    /// Per-status overrides of the default retry decision.
    pub custom_retry_for_status_codes: HashMap<u16, bool>,
    /// Period of the drain timer.
    pub emit_interval: Duration,
    /// Store limits enforced at the start of each drain cycle.
    pub eviction: EvictionPolicy,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            buffer: BufferOption::default(),
            emit_range: 150,
            byte_limit_get: 40_000,
            byte_limit_post: 40_000,
            thread_pool_size: 15,
            retry_failed_requests: true,
            custom_retry_for_status_codes: HashMap::new(),
            emit_interval: Duration::from_secs(5),
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Shortest drain period the timer accepts.
pub const MIN_EMIT_INTERVAL: Duration = Duration::from_millis(1);

impl EmitterConfig {
    /// Returns the config with unusable values raised to their minimum:
    /// `emit_range` and `thread_pool_size` to one, `emit_interval` to
    /// [`MIN_EMIT_INTERVAL`].
    pub fn normalized(mut self) -> Self {
        if self.emit_range == 0 {
            tracing::warn!("emit_range of 0 would never read a row, using 1");
            self.emit_range = 1;
        }
        if self.thread_pool_size == 0 {
            tracing::warn!("thread_pool_size of 0 would never send, using 1");
            self.thread_pool_size = 1;
        }
        if self.emit_interval < MIN_EMIT_INTERVAL {
            tracing::warn!(
                interval_ms = u64::try_from(self.emit_interval.as_millis()).unwrap_or(u64::MAX),
                "emit_interval below minimum, using 1ms"
            );
            self.emit_interval = MIN_EMIT_INTERVAL;
        }
        self
    }

    /// Byte ceiling for requests sent with `method`.
    pub fn byte_limit(&self, method: HttpMethod) -> usize {
        match method {
            HttpMethod::Get => self.byte_limit_get,
            HttpMethod::Post => self.byte_limit_post,
        }
    }
}
