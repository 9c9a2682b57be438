//! Hostlink bridge client.
//!
//! Talks to the bridge's local HTTP front from a separate process:
//!
//! - Validating the configured base URL before any request is built
//! - Submitting operations with [`BridgeClient::trigger`]
//! - Polling [`BridgeClient::status`] until a terminal result with [`BridgeClient::await_result`]
//! - Falling back to another candidate URL when the active one refuses connections
//!
//! The poller sleeps between polls with `tokio::time::sleep`; it never blocks a thread and it
//! cannot cancel an operation that is already running on the host.
//!
//! # Example
//!
//! ```ignore
//! use hostlink_api::BridgeClient;
//! use serde_json::Map;
//! use std::time::Duration;
//!
//! async fn run() -> Result<(), hostlink_api::ClientError> {
//!     let client = BridgeClient::new("http://127.0.0.1:48884")?;
//!     let value = client.submit_and_wait("ping", Map::new(), Duration::from_secs(10)).await?;
//!     println!("{value}");
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, RwLock};
use std::time::Duration;

use hostlink_types::{EventResult, PollerSettings, TriggerPayload, TriggerResponse};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-request ceiling for the underlying HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling for a `/health` probe while looking for a live candidate.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Hostnames accepted with any scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Failures observed by the client.
///
/// Transport problems are kept apart from failures reported by the host so callers
/// can decide whether retrying makes sense.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid bridge URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The bridge refused the submission (HTTP 4xx).
    #[error("bridge rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The operation ran on the host and failed.
    #[error("host execution failed for event {event_id}: {message}")]
    HostExecution { event_id: String, message: String },

    #[error("timed out after {timeout:?} waiting for event {event_id}")]
    Timeout { event_id: String, timeout: Duration },

    /// The id was never issued or its result has been pruned.
    #[error("event {event_id} not found")]
    NotFound { event_id: String },

    #[error("invalid response from bridge: {0}")]
    InvalidResponse(String),
}

/// Thin wrapper around a configured `reqwest::Client` for the bridge endpoints.
///
/// The client talks to one active base URL. When a request cannot connect, the
/// other candidates are probed through `/health` and the request is retried once
/// against the first one that answers. Clones share the active URL.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    candidates: Vec<Url>,
    active: Arc<RwLock<Url>>,
    http: Client,
    poll_interval: Duration,
}

impl BridgeClient {
    /// Construct a client for `base_url`, e.g. `http://127.0.0.1:48884`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = validate_base_url(base_url)?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("hostlink/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            candidates: vec![base_url.clone()],
            active: Arc::new(RwLock::new(base_url)),
            http,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn from_settings(settings: &PollerSettings) -> Result<Self, ClientError> {
        Ok(Self::new(&settings.base_url)?
            .with_fallback_urls(&settings.fallback_urls)?
            .with_poll_interval(Duration::from_millis(settings.poll_interval_ms)))
    }

    /// Add candidate URLs tried, in order, when the active URL refuses connections.
    pub fn with_fallback_urls<S: AsRef<str>>(mut self, urls: &[S]) -> Result<Self, ClientError> {
        for url in urls {
            let url = validate_base_url(url.as_ref())?;
            if !self.candidates.contains(&url) {
                self.candidates.push(url);
            }
        }
        Ok(self)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The base URL requests currently go to.
    pub fn base_url(&self) -> Url {
        self.active.read().expect("active url lock poisoned").clone()
    }

    pub fn candidates(&self) -> &[Url] {
        &self.candidates
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submit an operation and return its event id. Does not wait for execution.
    pub async fn trigger(&self, operation: &str, params: Map<String, Value>) -> Result<String, ClientError> {
        let payload = TriggerPayload {
            operation: Some(operation.to_string()),
            params: Some(params),
        };
        debug!(operation, "triggering bridge operation");

        let response = self
            .send(Method::POST, &["events", "trigger"], |request| request.json(&payload))
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        let acknowledgement: TriggerResponse = response
            .json()
            .await
            .map_err(|error| ClientError::InvalidResponse(error.to_string()))?;
        info!(event_id = %acknowledgement.event_id, operation, "bridge accepted operation");
        Ok(acknowledgement.event_id)
    }

    /// Fetch the current result for `event_id`. An unknown id yields `EventResult::NotFound`.
    pub async fn status(&self, event_id: &str) -> Result<EventResult, ClientError> {
        let response = self.send(Method::GET, &["events", "status", event_id], |request| request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(EventResult::NotFound);
        }
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }
        response
            .json()
            .await
            .map_err(|error| ClientError::InvalidResponse(error.to_string()))
    }

    /// Poll until `event_id` is terminal or `timeout` elapses.
    ///
    /// Returns the completed payload. A failed result becomes [`ClientError::HostExecution`],
    /// an unknown id [`ClientError::NotFound`], and an elapsed deadline [`ClientError::Timeout`].
    pub async fn await_result(&self, event_id: &str, timeout: Duration) -> Result<Value, ClientError> {
        let deadline = Instant::now() + timeout;
        let timed_out = || ClientError::Timeout {
            event_id: event_id.to_string(),
            timeout,
        };

        loop {
            let result = timeout_at(deadline, self.status(event_id)).await.map_err(|_| timed_out())??;
            match result {
                EventResult::Completed { result } => return Ok(result),
                EventResult::Failed { message } => {
                    return Err(ClientError::HostExecution {
                        event_id: event_id.to_string(),
                        message,
                    });
                }
                EventResult::NotFound => {
                    return Err(ClientError::NotFound {
                        event_id: event_id.to_string(),
                    });
                }
                EventResult::Processing => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Trigger `operation` and wait for its result.
    pub async fn submit_and_wait(&self, operation: &str, params: Map<String, Value>, timeout: Duration) -> Result<Value, ClientError> {
        let event_id = self.trigger(operation, params).await?;
        self.await_result(&event_id, timeout).await
    }

    /// Fetch `/health` as raw JSON.
    pub async fn health(&self) -> Result<Value, ClientError> {
        let response = self.send(Method::GET, &["health"], |request| request).await?.error_for_status()?;
        response
            .json()
            .await
            .map_err(|error| ClientError::InvalidResponse(error.to_string()))
    }

    /// Send a request to the active URL, switching candidates once on a connect error.
    async fn send<F>(&self, method: Method, segments: &[&str], decorate: F) -> Result<Response, ClientError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let base = self.base_url();
        let url = endpoint(&base, segments)?;
        let failure = match decorate(self.http.request(method.clone(), url)).send().await {
            Ok(response) => return Ok(response),
            Err(failure) if failure.is_connect() => failure,
            Err(failure) => return Err(failure.into()),
        };

        warn!(url = %base, error = %failure, "bridge refused connection, probing other candidates");
        let Some(next) = self.rediscover(&base).await else {
            return Err(failure.into());
        };
        let url = endpoint(&next, segments)?;
        Ok(decorate(self.http.request(method, url)).send().await?)
    }

    /// Probe every candidate except `failed` through `/health`; the first that answers
    /// becomes the active URL.
    async fn rediscover(&self, failed: &Url) -> Option<Url> {
        for candidate in self.candidates.iter().filter(|candidate| *candidate != failed) {
            let Ok(url) = endpoint(candidate, &["health"]) else {
                continue;
            };
            match self.http.get(url).timeout(DISCOVERY_TIMEOUT).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url = %candidate, "switched to responding bridge URL");
                    *self.active.write().expect("active url lock poisoned") = candidate.clone();
                    return Some(candidate.clone());
                }
                Ok(response) => debug!(url = %candidate, status = %response.status(), "candidate is not a bridge"),
                Err(error) => debug!(url = %candidate, error = %error, "candidate did not respond"),
            }
        }
        None
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidBaseUrl {
            url: base.to_string(),
            reason: "cannot be a base".into(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn rejection(status: StatusCode, response: Response) -> ClientError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    ClientError::Rejected {
        status: status.as_u16(),
        message,
    }
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Loopback hosts may use any scheme; anything else must be HTTPS.
fn validate_base_url(base: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };
    let parsed = Url::parse(base.trim()).map_err(|error| invalid(error.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    let host = parsed.host_str().ok_or_else(|| invalid("missing host".into()))?;
    if LOCALHOST_DOMAINS.iter().any(|allowed| host.eq_ignore_ascii_case(allowed)) {
        return Ok(parsed);
    }
    if parsed.scheme() != "https" {
        return Err(invalid(format!("non-local hosts must use https; got '{}://'", parsed.scheme())));
    }
    Ok(parsed)
}
