//! Integration tests for list page fetching through `PlatformApi`

use std::time::Duration;

use chrono::{TimeZone, Utc};
use salesync_core::domain::IntervalRange;
use salesync_core::ports::{IPlatformApi, ListQuery, PageFetch};
use salesync_upstream::provider::PlatformApi;
use serde_json::json;
use tokio::time::Instant;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

async fn api(server: &MockServer) -> PlatformApi {
    common::mount_token(server, "tok").await;
    PlatformApi::new(common::client(server))
}

#[tokio::test]
async fn test_range_query_parameters_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sales"))
        .and(query_param("page_number", "2"))
        .and(query_param("page_size", "50"))
        .and(query_param("start_date", "2024-01-01T00:00:00.000Z"))
        .and(query_param("end_date", "2024-01-31T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "S1"}, {"id": "S2"}],
            "has_more": true,
            "next_page": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server).await;
    let query = ListQuery {
        page: 2,
        page_size: 50,
        range: Some(IntervalRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        )),
    };

    let fetch = api.list_page("/sales", &query, deadline()).await.unwrap();
    let PageFetch::Page(page) = fetch else {
        panic!("expected a page, got {fetch:?}");
    };
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);
    assert_eq!(page.next_page, Some(3));
}

#[tokio::test]
async fn test_meta_pagination_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "C1"}],
            "meta": {"pagination": {"page": 4, "total_pages": 4}}
        })))
        .mount(&server)
        .await;

    let api = api(&server).await;
    let query = ListQuery {
        page: 4,
        page_size: 100,
        range: None,
    };

    let fetch = api.list_page("/customers", &query, deadline()).await.unwrap();
    assert_eq!(
        fetch,
        PageFetch::Page(salesync_core::ports::ListPage {
            items: vec![json!({"id": "C1"})],
            has_more: false,
            next_page: None,
        })
    );
}

#[tokio::test]
async fn test_not_found_is_unsupported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payouts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = api(&server).await;
    let query = ListQuery {
        page: 1,
        page_size: 100,
        range: None,
    };
    let fetch = api.list_page("/payouts", &query, deadline()).await.unwrap();
    assert_eq!(fetch, PageFetch::Unsupported);
}

#[tokio::test]
async fn test_html_body_is_unsupported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/enrollments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html><body>Login</body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let api = api(&server).await;
    let query = ListQuery {
        page: 1,
        page_size: 100,
        range: None,
    };
    let fetch = api.list_page("/enrollments", &query, deadline()).await.unwrap();
    assert_eq!(fetch, PageFetch::Unsupported);
}

#[tokio::test]
async fn test_other_statuses_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/refunds"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server).await;
    let query = ListQuery {
        page: 1,
        page_size: 100,
        range: None,
    };
    let fetch = api.list_page("/refunds", &query, deadline()).await.unwrap();
    assert_eq!(fetch, PageFetch::Status(422));
}

#[tokio::test]
async fn test_malformed_json_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coupons"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{not json", "application/json"))
        .mount(&server)
        .await;

    let api = api(&server).await;
    let query = ListQuery {
        page: 1,
        page_size: 100,
        range: None,
    };
    assert!(api.list_page("/coupons", &query, deadline()).await.is_err());
}
