//! Shared rate-limited HTTP client for upstream game APIs.
//!
//! Every upstream integration (Riot, Nexon, Discord delivery) goes through an
//! [`ApiClient`] instance. The client serializes outbound requests with a
//! minimum inter-request spacing, retries exactly once after a fixed backoff
//! when the upstream answers HTTP 429, and translates non-2xx responses into
//! a typed error carrying a best-effort message parsed from the body.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Per-request timeout applied to every outbound call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Parses an upstream-specific error body into a human-readable message.
///
/// Returns `None` when the body is not in the upstream's error shape; the
/// client then falls back to a generic message keyed by status code.
pub type ErrorDecoder = fn(u16, &str) -> Option<String>;

/// Decoder for upstreams with no structured error body.
pub fn no_decoder(_status: u16, _body: &str) -> Option<String> {
    None
}

/// Errors from upstream HTTP calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by upstream (HTTP 429)")]
    Throttled,

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(reqwest::Error),
}

impl ApiError {
    /// True for a 404-class upstream miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// HTTP client with serialized request pacing and a single 429 retry.
///
/// One instance per upstream: pacing state is independent between upstreams.
pub struct ApiClient {
    http: reqwest::Client,
    min_interval: Duration,
    backoff: Duration,
    decode_error: ErrorDecoder,
    last_request: Mutex<Option<Instant>>,
}

impl ApiClient {
    pub fn new(min_interval: Duration, backoff: Duration, decode_error: ErrorDecoder) -> Self {
        Self {
            http: reqwest::Client::new(),
            min_interval,
            backoff,
            decode_error,
            last_request: Mutex::new(None),
        }
    }

    /// GET a JSON resource.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let mut builder = self.http.get(url).timeout(REQUEST_TIMEOUT);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.build()?;
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(ApiError::Decode)
    }

    /// POST a JSON body, discarding the response payload.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<(), ApiError> {
        let mut builder = self.http.post(url).timeout(REQUEST_TIMEOUT).json(body);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.build()?;
        self.send(request).await?;
        Ok(())
    }

    /// Issue a request with pacing, the single-retry throttle policy, and
    /// non-2xx translation.
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, ApiError> {
        // Clone up front: a request becomes unavailable once executed.
        let retry = request.try_clone();

        self.pace().await;
        let response = self.http.execute(request).await?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return self.check(response).await;
        }

        // Throttled: wait the fixed backoff and retry the same request once.
        let Some(retry) = retry else {
            return Err(ApiError::Throttled);
        };
        tokio::time::sleep(self.backoff).await;
        let response = self.http.execute(retry).await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::Throttled);
        }
        self.check(response).await
    }

    /// Block until at least `min_interval` has passed since the previous
    /// request on this instance, then record the new issue time.
    ///
    /// The elapsed-time check and the timestamp update happen under one lock
    /// so two concurrent callers cannot both pass a stale check. The lock is
    /// held across the pacing sleep only, never across the HTTP round trip.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Translate a non-2xx response into a typed error.
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = (self.decode_error)(status, &body)
            .unwrap_or_else(|| generic_status_message(status).to_string());
        Err(ApiError::Status { status, message })
    }
}

/// Percent-encode a single path or query segment.
pub(crate) fn path_escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{byte:02X}"));
            }
        }
    }
    out
}

/// Fallback messages for error responses without a parseable body.
fn generic_status_message(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        401 => "unauthorized",
        403 => "forbidden (check the API key)",
        404 => "not found",
        500 => "upstream internal error",
        502 => "bad gateway",
        503 => "upstream under maintenance",
        _ => "unexpected upstream response",
    }
}
