//! Deciding what happens to rows after a request completes.

use std::collections::HashMap;

use crate::request::RequestResult;

/// Client-error codes that will never succeed on retry.
pub const DEFAULT_NO_RETRY_STATUS_CODES: [u16; 5] = [400, 401, 403, 410, 422];

/// What to do with the rows a request covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delivered; remove the rows.
    Sent,
    /// Failed terminally; remove the rows without delivering them.
    Dropped,
    /// Failed transiently; keep the rows for a later cycle.
    Retained,
}

impl Disposition {
    /// `true` if the rows must be removed from the store.
    pub fn removes_rows(self) -> bool {
        matches!(self, Self::Sent | Self::Dropped)
    }
}

/// Retry rules: a global switch plus per-status overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    enabled: bool,
    overrides: HashMap<u16, bool>,
}

impl RetryPolicy {
    pub fn new(enabled: bool, overrides: HashMap<u16, bool>) -> Self {
        Self { enabled, overrides }
    }

    /// Whether a failed request with `status` should be retried.
    ///
    /// An override for the exact status wins. Otherwise every failure is
    /// retried except the [`DEFAULT_NO_RETRY_STATUS_CODES`]; a missing
    /// response is retried.
    pub fn should_retry(&self, status: Option<u16>) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(code) = status else {
            return true;
        };
        self.overrides
            .get(&code)
            .copied()
            .unwrap_or_else(|| !DEFAULT_NO_RETRY_STATUS_CODES.contains(&code))
    }

    /// Classifies a finished request.
    pub fn disposition(&self, result: &RequestResult) -> Disposition {
        if result.is_successful() {
            Disposition::Sent
        } else if result.oversize || !self.should_retry(result.status) {
            Disposition::Dropped
        } else {
            Disposition::Retained
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(true, HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Option<u16>, oversize: bool) -> RequestResult {
        RequestResult {
            status,
            oversize,
            ids: vec![1],
        }
    }

    #[test]
    fn default_policy_retries_all_but_terminal_codes() {
        let policy = RetryPolicy::default();
        for code in DEFAULT_NO_RETRY_STATUS_CODES {
            assert!(!policy.should_retry(Some(code)), "{code} is terminal");
        }
        assert!(policy.should_retry(Some(500)));
        assert!(policy.should_retry(Some(404)));
        assert!(policy.should_retry(None));
    }

    #[test]
    fn override_applies_to_named_code_only() {
        let policy = RetryPolicy::new(true, HashMap::from([(403, true), (500, false)]));
        assert!(policy.should_retry(Some(403)));
        assert!(!policy.should_retry(Some(500)));
        assert!(!policy.should_retry(Some(401)), "other defaults untouched");
        assert!(policy.should_retry(Some(503)), "other defaults untouched");
    }

    #[test]
    fn disabled_retry_drops_every_failure() {
        let policy = RetryPolicy::new(false, HashMap::from([(500, true)]));
        assert_eq!(policy.disposition(&result(Some(500), false)), Disposition::Dropped);
        assert_eq!(policy.disposition(&result(None, false)), Disposition::Dropped);
        assert_eq!(policy.disposition(&result(Some(200), false)), Disposition::Sent);
    }

    #[test]
    fn oversize_is_never_retained() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.disposition(&result(Some(500), true)), Disposition::Dropped);
        assert_eq!(policy.disposition(&result(None, true)), Disposition::Dropped);
        assert_eq!(policy.disposition(&result(Some(500), false)), Disposition::Retained);
    }
}
