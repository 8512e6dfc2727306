//! Grouping stored rows into transport requests.

use pulse_store::StoredEvent;
use pulse_types::{schemas::keys, Payload};

use crate::config::HttpMethod;

/// Bytes reserved per payload for the `stm` field added at send time.
pub const STM_BYTES: usize = 22;
/// Bytes for the comma between payloads in a POST body.
pub const SEPARATOR_BYTES: usize = 1;
/// Bytes for the `{"schema": ..., "data": [...]}` wrapper of a POST body.
pub const POST_WRAPPER_BYTES: usize = 88;

/// One transport call covering one or more store rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Payloads in row order.
    pub payloads: Vec<Payload>,
    /// Store ids of the rows, parallel to `payloads`.
    pub ids: Vec<i64>,
    /// `true` for a single row that alone exceeds the byte ceiling.
    pub oversize: bool,
}

impl Request {
    fn new(rows: Vec<StoredEvent>, oversize: bool) -> Self {
        let (ids, payloads) = rows.into_iter().map(|r| (r.id, r.payload)).unzip();
        Self {
            payloads,
            ids,
            oversize,
        }
    }

    /// Sets the sent timestamp on every payload.
    pub fn stamp_sent(&mut self, sent_ms: i64) {
        let sent = sent_ms.to_string();
        for payload in &mut self.payloads {
            payload.insert(keys::SENT_TIMESTAMP, sent.as_str());
        }
    }
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestResult {
    /// Status code, or `None` if no response was received.
    pub status: Option<u16>,
    /// Copied from the request; oversize results are never retried.
    pub oversize: bool,
    /// Store ids of the rows the request covered.
    pub ids: Vec<i64>,
}

impl RequestResult {
    /// Result of sending `request` with the given response status.
    pub fn for_request(request: &Request, status: Option<u16>) -> Self {
        Self {
            status,
            oversize: request.oversize,
            ids: request.ids.clone(),
        }
    }

    /// `true` iff the status is in the 2xx range.
    pub fn is_successful(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

/// Groups `rows` into requests.
///
/// GET requests carry one row each. POST requests accumulate rows greedily
/// in order until adding the next row would exceed `byte_limit` or the
/// request already holds `buffer_size` rows. Any row too large to fit on
/// its own becomes a separate oversize request.
pub fn build_requests(
    rows: Vec<StoredEvent>,
    method: HttpMethod,
    buffer_size: usize,
    byte_limit: usize,
) -> Vec<Request> {
    match method {
        HttpMethod::Get => rows
            .into_iter()
            .map(|row| {
                let oversize = row.payload.byte_size() + STM_BYTES > byte_limit;
                Request::new(vec![row], oversize)
            })
            .collect(),
        HttpMethod::Post => build_post_requests(rows, buffer_size.max(1), byte_limit),
    }
}

fn build_post_requests(rows: Vec<StoredEvent>, buffer_size: usize, byte_limit: usize) -> Vec<Request> {
    let mut requests = Vec::new();
    let mut batch: Vec<StoredEvent> = Vec::new();
    let mut batch_bytes = 0;

    for row in rows {
        let size = row.payload.byte_size() + STM_BYTES + SEPARATOR_BYTES;

        if size + POST_WRAPPER_BYTES > byte_limit {
            requests.push(Request::new(vec![row], true));
            continue;
        }

        let full = batch.len() >= buffer_size;
        let too_big = batch_bytes + size + POST_WRAPPER_BYTES > byte_limit;
        if !batch.is_empty() && (full || too_big) {
            requests.push(Request::new(std::mem::take(&mut batch), false));
            batch_bytes = 0;
        }

        batch_bytes += size;
        batch.push(row);
    }

    if !batch.is_empty() {
        requests.push(Request::new(batch, false));
    }
    requests
}
