//! The transport contract and the blocking HTTP transport.

use std::sync::OnceLock;
use std::time::Duration;

use pulse_types::schemas;
use reqwest::blocking::Client;
use serde_json::{json, Value};

use crate::config::HttpMethod;
use crate::request::{Request, RequestResult};

const POST_PATH: &str = "/com.pulse/tp2";
const GET_PATH: &str = "/i";

/// Sends one request and reports its outcome.
///
/// `send` is called on a blocking worker thread, once per request, and may
/// be called concurrently. A failure to get any response is reported as a
/// result with no status code, never as a panic.
pub trait Transport: Send + Sync + 'static {
    /// Request style; decides how rows are grouped.
    fn method(&self) -> HttpMethod;

    /// Sends `request` and returns its result.
    fn send(&self, request: &Request) -> RequestResult;
}

/// Errors from constructing a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The collector endpoint is unusable.
    #[error("invalid collector endpoint: {0}")]
    Endpoint(String),
}

/// Delivers requests to a collector over HTTP with `reqwest`'s blocking
/// client.
#[derive(Debug)]
pub struct HttpTransport {
    endpoint: String,
    method: HttpMethod,
    timeout: Duration,
    // Built on first send: the blocking client must not be created on an
    // async worker thread.
    client: OnceLock<Option<Client>>,
}

impl HttpTransport {
    /// Creates a transport for the collector at `endpoint` (scheme and
    /// host, e.g. `https://collector.example.com`).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Endpoint` if `endpoint` is not an http(s) URL.
    pub fn new(
        endpoint: impl Into<String>,
        method: HttpMethod,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(TransportError::Endpoint(format!(
                "expected an http(s) URL, got {endpoint:?}"
            )));
        }
        Ok(Self {
            endpoint,
            method,
            timeout,
            client: OnceLock::new(),
        })
    }

    fn client(&self) -> Option<&Client> {
        self.client
            .get_or_init(|| match Client::builder().timeout(self.timeout).build() {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::error!(error = %e, "failed to build HTTP client");
                    None
                }
            })
            .as_ref()
    }

    /// The URL requests are sent to.
    pub fn url(&self) -> String {
        let path = match self.method {
            HttpMethod::Get => GET_PATH,
            HttpMethod::Post => POST_PATH,
        };
        format!("{}{}", self.endpoint, path)
    }

    fn post_body(request: &Request) -> Value {
        let data: Vec<Value> = request
            .payloads
            .iter()
            .map(|p| {
                p.iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            })
            .collect();
        json!({ "schema": schemas::PAYLOAD_DATA, "data": data })
    }
}

impl Transport for HttpTransport {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn send(&self, request: &Request) -> RequestResult {
        let Some(client) = self.client() else {
            return RequestResult::for_request(request, None);
        };

        let builder = match self.method {
            HttpMethod::Post => client.post(self.url()).json(&Self::post_body(request)),
            HttpMethod::Get => {
                let query: Vec<(&str, &str)> = request
                    .payloads
                    .first()
                    .map(|p| p.iter().collect())
                    .unwrap_or_default();
                client.get(self.url()).query(&query)
            }
        };

        match builder.send() {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::debug!(status, rows = request.ids.len(), "request completed");
                RequestResult::for_request(request, Some(status))
            }
            Err(e) => {
                tracing::warn!(error = %e, rows = request.ids.len(), "request failed without response");
                RequestResult::for_request(request, None)
            }
        }
    }
}
