//! SyncEngine runs over a scripted upstream

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};

use salesync_core::domain::{
    ResourceName, SupportMap, SupportStatus, SyncCursor, SyncRequest, Table,
};
use salesync_core::ports::{keys, ListPage, PageFetch};
use salesync_sync::{registry, SyncEngine, SyncSettings, WriterSettings};

use crate::common::{start_time, Harness, Reply};

const BUDGET: Duration = Duration::from_secs(10);

fn stored_cursor(h: &Harness) -> Option<SyncCursor> {
    h.state
        .snapshot(keys::SYNC_CURSOR)
        .map(|value| serde_json::from_value(value).unwrap())
}

fn stored_support(h: &Harness) -> SupportMap {
    h.state
        .snapshot(keys::RESOURCE_SUPPORT)
        .map(|value| serde_json::from_value(value).unwrap())
        .unwrap_or_default()
}

fn sale(id: &str, customer: Option<&str>) -> Value {
    match customer {
        Some(customer) => json!({
            "id": id,
            "status": "approved",
            "customer": {"id": customer, "email": format!("{customer}@example.com")}
        }),
        None => json!({"id": id, "status": "pending"}),
    }
}

// ============================================================================
// Full cycles
// ============================================================================

#[tokio::test]
async fn test_default_request_walks_every_resource_and_interval() {
    let h = Harness::new().await;

    let report = h.engine().run(&SyncRequest::Default, BUDGET).await;

    assert!(report.ok, "{:?}", report.error);
    assert!(report.done);
    // Seven range-capable resources over two intervals, products once
    assert_eq!(report.pages_fetched, 15);
    assert_eq!(h.api.calls().len(), 15);

    let products = h.api.calls_to("/products");
    assert_eq!(products.len(), 1);
    assert!(products[0].range.is_none());

    let sales = h.api.calls_to("/sales");
    assert_eq!(sales.len(), 2);
    let rolling = sales[0].range.unwrap();
    assert_eq!(rolling.start, start_time() - ChronoDuration::days(90));
    assert_eq!(rolling.end, start_time());
    let today = sales[1].range.unwrap();
    assert_eq!(today.start, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

    let cursor = stored_cursor(&h).unwrap();
    assert!(cursor.done);
    assert_eq!(cursor.resource, ResourceName::Products);
}

#[tokio::test]
async fn test_completed_cycle_starts_over() {
    let h = Harness::new().await;
    let engine = h.engine();

    assert!(engine.run(&SyncRequest::Default, BUDGET).await.done);
    h.api.clear_calls();

    let report = engine.run(&SyncRequest::Default, BUDGET).await;

    assert!(report.done);
    let calls = h.api.calls();
    assert_eq!(calls[0].0, "/products");
    assert_eq!(calls[0].1.page, 1);
}

#[tokio::test]
async fn test_pages_follow_has_more() {
    let h = Harness::new().await;
    h.api.push_page("/refunds", vec![json!({"id": "R-1"})], true);
    h.api.push_page("/refunds", vec![json!({"id": "R-2"})], false);

    let report = h.engine().run(&SyncRequest::Default, BUDGET).await;

    assert!(report.ok);
    let pages: Vec<u32> = h.api.calls_to("/refunds").iter().map(|q| q.page).collect();
    assert_eq!(pages, vec![1, 2, 1]);
    assert_eq!(h.rows.count(Table::Refunds).await, 2);
    assert_eq!(report.rows_written.get(&ResourceName::Refunds), Some(&2));
}

#[tokio::test]
async fn test_explicit_next_page_is_followed() {
    let h = Harness::new().await;
    h.api.push(
        "/coupons",
        Reply::Fetch(PageFetch::Page(ListPage {
            items: vec![json!({"id": "CP-1"})],
            has_more: true,
            next_page: Some(4),
        })),
    );

    h.engine().run(&SyncRequest::Full, BUDGET).await;

    let pages: Vec<u32> = h.api.calls_to("/coupons").iter().map(|q| q.page).collect();
    assert_eq!(pages, vec![1, 4]);
}

// ============================================================================
// Failures keep the cursor
// ============================================================================

#[tokio::test]
async fn test_upstream_error_stops_and_resumes_at_same_page() {
    let h = Harness::new().await;
    h.api.push("/sales", Reply::Fetch(PageFetch::Status(500)));
    let engine = h.engine();

    let report = engine.run(&SyncRequest::Default, BUDGET).await;

    assert!(!report.ok);
    assert!(!report.done);
    assert!(report.error.as_deref().unwrap().contains("HTTP 500"));
    assert_eq!(report.cursor.resource, ResourceName::Sales);
    assert_eq!(report.cursor.page, 1);
    assert_eq!(stored_cursor(&h), Some(report.cursor));

    h.api.clear_calls();
    let report = engine.run(&SyncRequest::Default, BUDGET).await;

    assert!(report.ok);
    assert!(report.done);
    assert_eq!(h.api.calls()[0].0, "/sales");
}

#[tokio::test]
async fn test_fetch_error_is_reported() {
    let h = Harness::new().await;
    h.api.push("/products", Reply::Fail("connection reset by peer"));

    let report = h.engine().run(&SyncRequest::Default, BUDGET).await;

    assert!(!report.ok);
    assert!(report
        .error
        .as_deref()
        .unwrap()
        .contains("connection reset by peer"));
    assert_eq!(report.cursor, SyncCursor::initial());
    assert!(stored_cursor(&h).is_none());
}

#[tokio::test]
async fn test_zero_budget_makes_no_calls() {
    let h = Harness::new().await;

    let report = h.engine().run(&SyncRequest::Default, Duration::ZERO).await;

    assert!(report.ok);
    assert!(!report.done);
    assert_eq!(report.pages_fetched, 0);
    assert!(h.api.calls().is_empty());
    assert_eq!(report.cursor, SyncCursor::initial());
}

#[tokio::test]
async fn test_missing_resource_configuration_stops_run() {
    let h = Harness::new().await;
    let resources = registry()
        .iter()
        .copied()
        .filter(|c| c.name != ResourceName::Sales)
        .collect();
    let engine = h.engine().with_resources(resources);

    let report = engine.run(&SyncRequest::Default, BUDGET).await;

    assert!(!report.ok);
    assert_eq!(
        report.error.as_deref(),
        Some("No resource configuration for sales")
    );
    assert_eq!(report.cursor.resource, ResourceName::Sales);
}

#[tokio::test]
async fn test_sale_with_unknown_customer_is_written_unlinked() {
    let h = Harness::new().await;
    h.api.push_page(
        "/sales",
        vec![json!({"id": "S-1", "customer_id": "C-404"})],
        false,
    );

    let report = h.engine().run(&SyncRequest::Full, BUDGET).await;

    assert!(report.ok);
    let stored = h.rows.get(Table::Sales, "id", "S-1").await;
    assert!(stored[0].get("customer_id").map_or(true, Value::is_null));
    assert_eq!(stored[0]["customer_external_id"], json!("C-404"));
}

#[tokio::test]
async fn test_write_failure_keeps_cursor_on_page() {
    let h = Harness::new().await;
    h.api.push_page("/products", vec![json!({"id": "P-1"})], false);
    // A zero write budget fails the first page that has rows
    let writer = h.writer_with(WriterSettings {
        batch_size: 10,
        budget: Duration::ZERO,
    });
    let engine = SyncEngine::new(
        h.api.clone(),
        h.state.clone(),
        writer,
        h.clock.clone(),
        SyncSettings::default(),
    );

    let report = engine.run(&SyncRequest::Default, BUDGET).await;

    assert!(!report.ok);
    assert!(report.error.as_deref().unwrap().starts_with("Writing products failed"));
    assert_eq!(report.cursor, SyncCursor::initial());
    assert!(stored_cursor(&h).is_none());
    assert_eq!(h.rows.count(Table::Products).await, 0);
}

// ============================================================================
// Resource support
// ============================================================================

#[tokio::test]
async fn test_unsupported_resource_is_skipped_until_recheck() {
    let h = Harness::new().await;
    h.api.push("/payouts", Reply::Fetch(PageFetch::Unsupported));
    let engine = h.engine();

    let report = engine.run(&SyncRequest::Default, BUDGET).await;
    assert!(report.ok);
    assert!(report.done);
    assert_eq!(
        stored_support(&h).get(ResourceName::Payouts).status,
        SupportStatus::Unsupported
    );

    h.api.clear_calls();
    h.clock.advance(ChronoDuration::hours(1));
    let report = engine.run(&SyncRequest::Default, BUDGET).await;
    assert!(report.done);
    assert!(h.api.calls_to("/payouts").is_empty());

    h.api.clear_calls();
    h.clock.advance(ChronoDuration::hours(24));
    engine.run(&SyncRequest::Default, BUDGET).await;
    assert_eq!(h.api.calls_to("/payouts").len(), 2);
    assert_eq!(
        stored_support(&h).get(ResourceName::Payouts).status,
        SupportStatus::Supported
    );
}

#[tokio::test]
async fn test_repeated_unsupported_answer_restarts_recheck_window() {
    let h = Harness::new().await;
    h.api.push("/payouts", Reply::Fetch(PageFetch::Unsupported));
    h.api.push("/payouts", Reply::Fetch(PageFetch::Unsupported));
    let engine = h.engine();

    engine.run(&SyncRequest::Default, BUDGET).await;
    h.clock.advance(ChronoDuration::hours(25));
    engine.run(&SyncRequest::Default, BUDGET).await;

    let checked_at = stored_support(&h).get(ResourceName::Payouts).checked_at;
    assert_eq!(checked_at, Some(start_time() + ChronoDuration::hours(25)));
}

// ============================================================================
// Intervals and writes
// ============================================================================

#[tokio::test]
async fn test_cursor_from_another_request_restarts_resource() {
    let h = Harness::new().await;
    let cursor = SyncCursor {
        resource: ResourceName::Sales,
        page: 3,
        interval_index: 1,
        done: false,
    };
    h.state
        .put(keys::SYNC_CURSOR, serde_json::to_value(cursor).unwrap());

    h.engine().run(&SyncRequest::Full, BUDGET).await;

    let first = &h.api.calls()[0];
    assert_eq!(first.0, "/sales");
    assert_eq!(first.1.page, 1);
    assert_eq!(first.1.range.unwrap().start, DateTime::<Utc>::default());
}

#[tokio::test]
async fn test_unreadable_cursor_starts_over() {
    let h = Harness::new().await;
    h.state.put(keys::SYNC_CURSOR, json!({"resource": "invoices"}));

    let report = h.engine().run(&SyncRequest::Default, BUDGET).await;

    assert!(report.ok);
    assert_eq!(h.api.calls()[0].0, "/products");
}

#[tokio::test]
async fn test_sale_pages_write_and_link_customers() {
    let h = Harness::new().await;
    let page = vec![
        sale("S-1", Some("C-1")),
        sale("S-2", Some("C-1")),
        sale("S-3", None),
    ];
    h.api.push_page("/sales", page.clone(), false);
    let engine = h.engine();

    let report = engine.run(&SyncRequest::Default, BUDGET).await;

    assert!(report.ok);
    assert_eq!(report.rows_written.get(&ResourceName::Sales), Some(&3));
    assert_eq!(h.rows.count(Table::Customers).await, 1);
    let customer = h.rows.get(Table::Customers, "external_id", "C-1").await;
    let internal = customer[0]["id"].clone();
    for id in ["S-1", "S-2"] {
        let stored = h.rows.get(Table::Sales, "id", id).await;
        assert_eq!(stored[0]["customer_id"], internal);
    }

    // Re-syncing the same page converges to the same rows
    h.api.push_page("/sales", page, false);
    engine.run(&SyncRequest::Default, BUDGET).await;

    assert_eq!(h.rows.count(Table::Sales).await, 3);
    assert_eq!(h.rows.count(Table::Customers).await, 1);
    let customer = h.rows.get(Table::Customers, "external_id", "C-1").await;
    assert_eq!(customer[0]["id"], internal);
}

#[tokio::test]
async fn test_unmappable_items_are_dropped() {
    let h = Harness::new().await;
    h.api.push_page(
        "/subscriptions",
        vec![json!({"id": "SUB-1"}), json!({"status": "active"})],
        false,
    );

    let report = h.engine().run(&SyncRequest::Full, BUDGET).await;

    assert!(report.ok);
    assert_eq!(report.rows_fetched, 2);
    assert_eq!(h.rows.count(Table::Subscriptions).await, 1);
}
