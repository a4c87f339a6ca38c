//! Resilient HTTP client for the GitHub REST API.
//!
//! Every call carries a bounded timeout, classifies failures into the closed
//! [`GitHubErrorKind`](super::error::GitHubErrorKind) taxonomy, records rate
//! limit headers, and retries transient failures under the configured
//! [`RetryPolicy`]. The client is purely functional given its inputs: no
//! state beyond the shared rate-limit tracker.

use std::time::Duration;

use http::HeaderMap;
use serde::de::DeserializeOwned;

use super::error::{GitHubError, GitHubErrorKind, classify_status};
use super::rate_limit::{RateLimitInfo, RateLimitTracker};
use super::retry::{RetryDecision, RetryPolicy};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// A successful (2xx) upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, retained for `Link` and diagnostic parsing.
    pub headers: HeaderMap,
    /// Response body as text.
    pub body: String,
}

/// Construction parameters for [`UpstreamClient`].
#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    /// User agent identifying the caller; GitHub rejects anonymous clients.
    pub user_agent: String,
    /// Optional bearer token raising the rate limit.
    pub token: Option<String>,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retry behaviour.
    pub retry: RetryPolicy,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("octofeed/", env!("CARGO_PKG_VERSION")).to_owned(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP client wrapping `reqwest` with GitHub-specific behaviour.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
    tracker: RateLimitTracker,
}

impl UpstreamClient {
    /// Builds a client with GitHub's versioned accept header and the
    /// configured user agent baked into every request.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubErrorKind::Unknown`] when the underlying client
    /// cannot be constructed (malformed token header).
    pub fn new(config: &UpstreamClientConfig) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::ACCEPT,
            http::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            http::HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = config.token.as_deref() {
            let value = http::HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                GitHubError::new(GitHubErrorKind::Unknown, "token is not a valid header value")
            })?;
            headers.insert(http::header::AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|error| {
                GitHubError::new(
                    GitHubErrorKind::Unknown,
                    format!("build client failed: {error}"),
                )
            })?;

        Ok(Self {
            http,
            timeout: config.timeout,
            retry: config.retry.clone(),
            tracker: RateLimitTracker::new(),
        })
    }

    /// Most recent rate limit observation across this client's calls.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitInfo> {
        self.tracker.latest()
    }

    /// Issues a GET request, retrying transient failures per policy.
    ///
    /// # Errors
    ///
    /// Returns the classified [`GitHubError`] once the retry budget is
    /// exhausted or a non-retryable failure occurs.
    pub async fn request(&self, url: &str) -> Result<UpstreamResponse, GitHubError> {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(url).await {
                Ok(response) => return Ok(response),
                Err(error) => match self.retry.decide(attempt, &error) {
                    RetryDecision::Retry(delay) => {
                        tracing::debug!(
                            url,
                            kind = %error.kind,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "retrying upstream request"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => return Err(error),
                },
            }
        }
    }

    /// Issues a GET request and deserialises the JSON body.
    ///
    /// # Errors
    ///
    /// Propagates [`request`](Self::request) failures; a body that does not
    /// deserialise is classified as [`GitHubErrorKind::Unknown`].
    pub async fn request_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GitHubError> {
        let response = self.request(url).await?;
        serde_json::from_str(&response.body).map_err(|error| {
            GitHubError::new(
                GitHubErrorKind::Unknown,
                format!("response deserialisation failed: {error}"),
            )
        })
    }

    async fn attempt(&self, url: &str) -> Result<UpstreamResponse, GitHubError> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        // Rate limit headers arrive on failures too; always record them.
        self.tracker.record_headers(&headers);
        let request_id = header_string(&headers, "x-github-request-id");

        let body = response.text().await.map_err(map_transport_error)?;

        if (200..300).contains(&status) {
            return Ok(UpstreamResponse {
                status,
                headers,
                body,
            });
        }

        let message = extract_github_message(&body)
            .unwrap_or_else(|| format!("GitHub returned status {status}"));
        let kind = classify_status(status, &message);
        let rate_limit_reset = if kind == GitHubErrorKind::RateLimit {
            RateLimitInfo::from_headers(&headers).map(|info| info.reset)
        } else {
            None
        };

        Err(GitHubError::new(kind, message)
            .with_status(status)
            .with_retry_after(header_u64(&headers, "retry-after"))
            .with_rate_limit_reset(rate_limit_reset)
            .with_request_id(request_id))
    }
}

fn map_transport_error(error: reqwest::Error) -> GitHubError {
    if error.is_timeout() {
        GitHubError::new(GitHubErrorKind::Timeout, "upstream call timed out")
    } else {
        GitHubError::new(GitHubErrorKind::Network, format!("transport error: {error}"))
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|raw| raw.to_str().ok())
        .map(ToOwned::to_owned)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_string(headers, name).and_then(|value| value.trim().parse().ok())
}

/// Pulls the `message` field out of a GitHub JSON error body.
fn extract_github_message(body: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return None;
    };
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}
