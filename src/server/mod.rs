//! HTTP surface of the feed service.
//!
//! Three JSON endpoints sit behind the edge cache: the full activity feed,
//! a single-page preview for initial paint, and the profile card. Handlers
//! only build refresh closures and translate [`Served`] values into
//! responses; freshness decisions live in the cache layer.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::get;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::activity::Aggregator;
use crate::cache::{EdgeCache, Served, StoredResponse};
use crate::github::{ApiUserProfile, GitHubError, GitHubErrorKind, UpstreamClient};

/// Shared state behind every handler.
pub struct AppState {
    /// Serve-side cache front.
    pub edge: EdgeCache,
    /// Feed pipeline.
    pub aggregator: Aggregator,
    /// Raw upstream client, for the profile endpoint and rate-limit headers.
    pub client: UpstreamClient,
    /// Upstream API base URL.
    pub api_base: String,
    /// The single user this instance serves.
    pub username: String,
}

/// Builds the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/activity.json", get(activity))
        .route("/api/activity.preview.json", get(activity_preview))
        .route("/api/profile.json", get(profile))
        .with_state(state)
}

async fn activity(State(state): State<Arc<AppState>>) -> Response {
    let aggregator = state.aggregator.clone();
    let username = state.username.clone();
    let refresh = move || async move {
        let feed = aggregator.collect(&username).await?;
        into_stored(feed.generated_at, &feed)
    };
    respond(&state, "activity", refresh).await
}

async fn activity_preview(State(state): State<Arc<AppState>>) -> Response {
    let aggregator = state.aggregator.clone();
    let username = state.username.clone();
    let refresh = move || async move {
        let feed = aggregator.preview(&username).await?;
        into_stored(feed.generated_at, &feed)
    };
    respond(&state, "preview", refresh).await
}

async fn profile(State(state): State<Arc<AppState>>) -> Response {
    let client = state.client.clone();
    let url = format!("{}/users/{}", state.api_base, state.username);
    let refresh = move || async move {
        let card = client.request_json::<ApiUserProfile>(&url).await?;
        into_stored(Utc::now(), &card)
    };
    respond(&state, "profile", refresh).await
}

fn into_stored<T: Serialize>(
    generated_at: DateTime<Utc>,
    value: &T,
) -> Result<StoredResponse, GitHubError> {
    let body = serde_json::to_string(value).map_err(|error| {
        GitHubError::new(
            GitHubErrorKind::Unknown,
            format!("response serialisation failed: {error}"),
        )
    })?;
    Ok(StoredResponse { generated_at, body })
}

async fn respond<F, Fut>(state: &AppState, endpoint: &str, refresh: F) -> Response
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<StoredResponse, GitHubError>> + Send + 'static,
{
    match state.edge.serve(endpoint, &state.username, refresh).await {
        Ok(served) => success(state, &served),
        Err(error) => upstream_failure(&error),
    }
}

fn success(state: &AppState, served: &Served) -> Response {
    let policy = state.edge.policy();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    set_header(
        &mut headers,
        header::CACHE_CONTROL,
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            policy.max_age_seconds(),
            policy.stale_while_revalidate_seconds()
        ),
    );
    set_header(
        &mut headers,
        HeaderName::from_static("x-feed-generated-at"),
        served
            .generated_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    headers.insert(
        HeaderName::from_static("x-feed-cache"),
        HeaderValue::from_static(served.state.as_str()),
    );

    if let Some(info) = state.client.rate_limit() {
        set_header(
            &mut headers,
            HeaderName::from_static("x-ratelimit-remaining"),
            info.remaining.to_string(),
        );
        set_header(
            &mut headers,
            HeaderName::from_static("x-ratelimit-reset"),
            info.reset.to_string(),
        );
    }
    // A suppressed refresh carries the authoritative reset.
    if let Some(reset) = served.rate_limit_reset {
        set_header(
            &mut headers,
            HeaderName::from_static("x-ratelimit-reset"),
            reset.to_string(),
        );
    }

    (StatusCode::OK, headers, served.body.clone()).into_response()
}

/// Renders a miss whose inline refresh failed. Aged entries never reach
/// here; the cache absorbs their refresh failures. Every upstream failure
/// is the gateway's fault from the reader's side, so the status is always
/// 502; the body's `error` kind carries the real cause.
fn upstream_failure(error: &GitHubError) -> Response {
    let body = serde_json::json!({
        "error": error.kind.as_str(),
        "message": error.message,
        "errorInfo": error,
    });
    (StatusCode::BAD_GATEWAY, Json(body)).into_response()
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}
