//! Integration tests for the retry layer
//!
//! - Transient statuses are retried and bounded
//! - 401/403 triggers exactly one forced token refresh
//! - Non-transient statuses are returned untouched
//! - The account header rides along with every call

use std::time::Duration;

use salesync_upstream::client::{RetryPolicy, UpstreamClient};
use tokio::time::Instant;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, TOKEN_PATH};

#[tokio::test]
async fn test_three_transient_failures_then_success() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/sales"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sales"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let started = Instant::now();
    let deadline = started + Duration::from_secs(5);

    let response = client.get("/sales", &[], deadline).await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(Instant::now() <= deadline);
}

#[tokio::test]
async fn test_transient_failures_stop_after_max_retries() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/sales"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let response = client
        .get("/sales", &[], Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_retries_never_sleep_past_deadline() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/sales"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        call_timeout: Duration::from_secs(2),
        max_retries: 10,
        backoff_step: Duration::from_millis(100),
        backoff_cap: Duration::from_millis(100),
    };
    let client = common::client(&server).with_policy(policy);
    let deadline = Instant::now() + Duration::from_millis(250);

    let response = client.get("/sales", &[], deadline).await.unwrap();

    assert_eq!(response.status(), 429);
    assert!(Instant::now() < deadline + Duration::from_millis(100));
    let attempts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/sales")
        .count();
    assert!(attempts < 11, "retried {attempts} times");
}

#[tokio::test]
async fn test_unauthorized_refreshes_token_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("stale", 3600)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("fresh", 3600)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let response = client
        .get("/products", &[], Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_second_auth_failure_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("tok", 3600)))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payouts"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let response = client
        .get("/payouts", &[], Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/enrollments"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let response = client
        .get("/enrollments", &[], Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_account_header_is_sent() {
    let server = MockServer::start().await;
    common::mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path("/sales"))
        .and(header("x-account-id", "acct-42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = common::token_manager(&server, common::manual_clock(), None);
    let client = UpstreamClient::new(reqwest::Client::new(), server.uri(), tokens)
        .with_policy(common::fast_policy())
        .with_account("X-Account-Id", "acct-42");
    let response = client
        .get("/sales", &[], Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_expired_deadline_fails_without_calling() {
    let server = MockServer::start().await;
    let client = common::client(&server);

    let err = client
        .get("/sales", &[], Instant::now())
        .await
        .unwrap_err();

    assert!(matches!(err, salesync_upstream::UpstreamError::DeadlineExceeded));
    assert!(server.received_requests().await.unwrap().is_empty());
}
