//! Integration tests for the token manager
//!
//! - Single-flight refresh under concurrent callers
//! - Expiry with an injected clock, forced refresh and invalidation
//! - Error message extraction from the token endpoint
//! - Persistence and reload keyed by the credential tuple

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures_util::future::join_all;
use salesync_core::ports::{keys, IStateStore};
use salesync_upstream::auth::TokenManager;
use salesync_upstream::UpstreamError;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, MemoryStateStore, TOKEN_PATH};

#[tokio::test]
async fn test_concurrent_callers_share_one_token_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope=sales.read"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::token_body("tok-1", 3600))
                .set_delay(StdDuration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = common::token_manager(&server, common::manual_clock(), None);
    let calls = (0..16).map(|_| {
        let manager = manager.clone();
        async move { manager.get_token(false).await }
    });
    let results = join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), "Bearer tok-1");
    }

    // Served from cache afterwards
    assert_eq!(manager.get_token(false).await.unwrap(), "Bearer tok-1");
}

#[tokio::test]
async fn test_token_is_refreshed_inside_buffer_window() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("tok-1", 3600)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("tok-2", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let clock = common::manual_clock();
    let manager = common::token_manager(&server, clock.clone(), None);

    assert_eq!(manager.get_token(false).await.unwrap(), "Bearer tok-1");

    // expires_at = start + 3595s; still valid while now + 60s < expires_at
    clock.advance(Duration::seconds(3534));
    assert_eq!(manager.get_token(false).await.unwrap(), "Bearer tok-1");

    clock.advance(Duration::seconds(1));
    assert_eq!(manager.get_token(false).await.unwrap(), "Bearer tok-2");
}

#[tokio::test]
async fn test_force_refresh_and_invalidate_bypass_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("tok", 3600)))
        .expect(3)
        .mount(&server)
        .await;

    let manager = common::token_manager(&server, common::manual_clock(), None);
    manager.get_token(false).await.unwrap();
    manager.get_token(true).await.unwrap();
    manager.invalidate().await;
    assert!(manager.cached_expiry().await.is_none());
    manager.get_token(false).await.unwrap();
}

#[tokio::test]
async fn test_rejected_grant_surfaces_error_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "Client authentication failed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = common::token_manager(&server, common::manual_clock(), None);
    let err = manager.get_token(false).await.unwrap_err();

    match err {
        UpstreamError::TokenRejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Client authentication failed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_numeric_expires_in_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "token_type": "BEARER",
            "expires_in": "a while"
        })))
        .mount(&server)
        .await;

    let manager = common::token_manager(&server, common::manual_clock(), None);
    assert_eq!(manager.get_token(false).await.unwrap(), "Bearer tok");
    assert_eq!(
        manager.cached_expiry().await,
        Some(common::start_time() + Duration::seconds(295))
    );
}

#[tokio::test]
async fn test_persisted_token_is_reused_by_a_new_manager() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("tok-1", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStateStore::default());
    let clock = common::manual_clock();

    let shared: Arc<dyn IStateStore> = store.clone();

    let first = common::token_manager(&server, clock.clone(), Some(shared.clone()));
    assert_eq!(first.get_token(false).await.unwrap(), "Bearer tok-1");

    let record = store.snapshot(keys::OAUTH_TOKEN).expect("token persisted");
    assert_eq!(record["access_token"], "tok-1");
    assert!(record["expires_at"].is_i64());

    let second = common::token_manager(&server, clock, Some(shared));
    assert_eq!(second.get_token(false).await.unwrap(), "Bearer tok-1");
}

#[tokio::test]
async fn test_persisted_token_for_other_credentials_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::token_body("tok-new", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStateStore::default());
    store
        .set(
            keys::OAUTH_TOKEN,
            &json!({
                "access_token": "tok-old",
                "token_type": "Bearer",
                "expires_at": (common::start_time() + Duration::hours(1)).timestamp_millis(),
                "cache_key": "issued-for-rotated-secret"
            }),
        )
        .await
        .unwrap();

    let manager = TokenManager::new(
        reqwest::Client::new(),
        common::settings(&server, "secret-1"),
        common::manual_clock(),
        Some(store.clone() as Arc<dyn IStateStore>),
    );
    assert_eq!(manager.get_token(false).await.unwrap(), "Bearer tok-new");
}
