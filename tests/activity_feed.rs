//! End-to-end tests of the HTTP surface against a mocked upstream API.

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use octofeed::activity::{Aggregator, ForkResolver, PullRequestResolver, resolver_limiter};
use octofeed::cache::{CacheStore, EdgeCache, MemoryStore};
use octofeed::github::{EventSource, RetryPolicy};
use octofeed::{
    AppState, CachePolicy, UpstreamClient, UpstreamClientConfig, router,
};

/// Boots the full service wired to `github_uri`, returning its base URL.
async fn spawn_app(github_uri: &str) -> String {
    let client = UpstreamClient::new(&UpstreamClientConfig {
        retry: RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        },
        ..UpstreamClientConfig::default()
    })
    .expect("client should build");

    let store = MemoryStore::shared();
    let shared: Arc<dyn CacheStore> = store.clone();
    let limiter = resolver_limiter(4);
    let aggregator = Aggregator::new(
        EventSource::new(client.clone(), github_uri),
        ForkResolver::new(client.clone(), limiter.clone(), Some(shared.clone())),
        PullRequestResolver::new(client.clone(), limiter, Some(shared)),
        octofeed::AggregatorOptions::default(),
    );
    let state = Arc::new(AppState {
        edge: EdgeCache::new(store, CachePolicy::default()),
        aggregator,
        client,
        api_base: github_uri.to_owned(),
        username: "octocat".to_owned(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind an ephemeral port");
    let address = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .await
            .expect("server should run");
    });
    format!("http://{address}")
}

fn issue_event(server: &str) -> Value {
    json!({
        "id": "1",
        "type": "IssuesEvent",
        "actor": {
            "login": "octocat",
            "avatar_url": "https://avatars.example/u/1"
        },
        "repo": {
            "name": "acme/widget",
            "url": format!("{server}/repos/acme/widget")
        },
        "payload": {
            "action": "opened",
            "issue": {
                "number": 3,
                "title": "Widget wobbles",
                "html_url": "https://github.com/acme/widget/issues/3",
                "body": "It wobbles\nbadly."
            }
        },
        "created_at": "2025-03-01T09:00:00Z"
    })
}

fn trimmed_pr_event(server: &str) -> Value {
    json!({
        "id": "2",
        "type": "PullRequestEvent",
        "actor": {"login": "octocat"},
        "repo": {
            "name": "acme/widget",
            "url": format!("{server}/repos/acme/widget")
        },
        "payload": {
            "action": "closed",
            "number": 7,
            "pull_request": {
                "number": 7,
                "url": format!("{server}/repos/acme/widget/pulls/7")
            }
        },
        "created_at": "2025-03-02T12:00:00Z"
    })
}

async fn mount_not_a_fork(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"fork": false})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn activity_endpoint_serves_an_enriched_feed() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/events/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            trimmed_pr_event(&github.uri()),
            issue_event(&github.uri())
        ])))
        .mount(&github)
        .await;
    mount_not_a_fork(&github).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/pulls/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "number": 7,
            "title": "Ship the widget",
            "html_url": "https://github.com/acme/widget/pull/7",
            "merged": true
        })))
        .mount(&github)
        .await;

    let app = spawn_app(&github.uri()).await;
    let response = reqwest::get(format!("{app}/api/activity.json"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("x-feed-cache")
            .and_then(|v| v.to_str().ok()),
        Some("miss")
    );
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("public, max-age=60, stale-while-revalidate=300")
    );
    assert!(response.headers().contains_key("x-feed-generated-at"));

    let body: Value = response.json().await.expect("body should be JSON");
    assert_eq!(body["username"], "octocat");
    assert!(body.get("partial").is_none(), "clean runs omit the flag");

    let items = body["items"].as_array().expect("items should be an array");
    assert_eq!(items.len(), 2);

    // Newest first: the merged PR outranks the older issue.
    assert_eq!(items[0]["kind"], "pull_request_merged");
    assert_eq!(items[0]["title"], "Ship the widget");
    assert_eq!(items[0]["url"], "https://github.com/acme/widget/pull/7");
    assert_eq!(items[0]["createdAt"], "2025-03-02T12:00:00Z");

    assert_eq!(items[1]["kind"], "issue_opened");
    assert_eq!(items[1]["summary"], "It wobbles badly.");
    assert_eq!(items[1]["actor"]["login"], "octocat");
    assert_eq!(items[1]["actor"]["avatarUrl"], "https://avatars.example/u/1");
    assert_eq!(items[1]["actor"]["url"], "https://github.com/octocat");
    assert_eq!(items[1]["repo"]["name"], "acme/widget");
}

#[tokio::test]
async fn repeated_requests_are_served_from_cache() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/events/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_event(&github.uri())])))
        .expect(1)
        .mount(&github)
        .await;
    mount_not_a_fork(&github).await;

    let app = spawn_app(&github.uri()).await;
    let url = format!("{app}/api/activity.json");

    let first = reqwest::get(&url).await.expect("first request");
    assert_eq!(
        first
            .headers()
            .get("x-feed-cache")
            .and_then(|v| v.to_str().ok()),
        Some("miss")
    );

    let second = reqwest::get(&url).await.expect("second request");
    assert_eq!(
        second
            .headers()
            .get("x-feed-cache")
            .and_then(|v| v.to_str().ok()),
        Some("hit")
    );
    let body: Value = second.json().await.expect("body should be JSON");
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn preview_endpoint_needs_no_enrichment_mocks() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/events/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            trimmed_pr_event(&github.uri()),
            issue_event(&github.uri())
        ])))
        .mount(&github)
        .await;

    let app = spawn_app(&github.uri()).await;
    let response = reqwest::get(format!("{app}/api/activity.preview.json"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("body should be JSON");
    let items = body["items"].as_array().expect("items should be an array");
    assert_eq!(items.len(), 2);
    // Without detail the closed PR stays a plain close with a synthesised
    // title and permalink.
    assert_eq!(items[0]["kind"], "pull_request_closed");
    assert_eq!(items[0]["title"], "Closed pull request #7");
    assert_eq!(items[0]["url"], "https://github.com/acme/widget/pull/7");
}

#[tokio::test]
async fn profile_endpoint_serves_the_user_card() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": "octocat",
            "name": "The Octocat",
            "avatar_url": "https://avatars.example/u/1",
            "html_url": "https://github.com/octocat",
            "bio": "I make feeds",
            "public_repos": 8,
            "followers": 1000
        })))
        .mount(&github)
        .await;

    let app = spawn_app(&github.uri()).await;
    let response = reqwest::get(format!("{app}/api/profile.json"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("body should be JSON");
    assert_eq!(body["login"], "octocat");
    assert_eq!(body["name"], "The Octocat");
    assert_eq!(body["followers"], 1000);
}

#[tokio::test]
async fn upstream_failure_on_a_cold_cache_is_a_gateway_error() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/events/public"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "Server Error"
        })))
        .mount(&github)
        .await;

    let app = spawn_app(&github.uri()).await;
    let response = reqwest::get(format!("{app}/api/activity.json"))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.expect("body should be JSON");
    assert_eq!(body["error"], "server");
    assert_eq!(body["errorInfo"]["kind"], "server");
    assert_eq!(body["errorInfo"]["status"], 500);
}

#[tokio::test]
async fn rate_limited_cold_cache_is_still_a_gateway_error() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/events/public"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"message": "API rate limit exceeded for 1.2.3.4"}))
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1700000000"),
        )
        .mount(&github)
        .await;

    let app = spawn_app(&github.uri()).await;
    let response = reqwest::get(format!("{app}/api/activity.json"))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.expect("body should be JSON");
    assert_eq!(body["error"], "rate_limit");
    assert_eq!(body["errorInfo"]["rateLimitReset"], 1_700_000_000);
}

#[tokio::test]
async fn enrichment_failure_degrades_to_a_partial_feed() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/events/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            trimmed_pr_event(&github.uri()),
            issue_event(&github.uri())
        ])))
        .mount(&github)
        .await;
    mount_not_a_fork(&github).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widget/pulls/7"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "Server Error"
        })))
        .mount(&github)
        .await;

    let app = spawn_app(&github.uri()).await;
    let response = reqwest::get(format!("{app}/api/activity.json"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200, "partial beats failing");
    let body: Value = response.json().await.expect("body should be JSON");
    assert_eq!(body["partial"], true);
    assert_eq!(body["errorInfo"]["kind"], "server");

    let items = body["items"].as_array().expect("items should be an array");
    assert_eq!(items.len(), 2, "the unenriched PR event still appears");
    assert_eq!(items[0]["kind"], "pull_request_closed");
}
