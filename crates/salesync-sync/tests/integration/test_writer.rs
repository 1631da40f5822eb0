//! BatchedWriter against a real SQLite store

use std::time::Duration;

use serde_json::json;

use salesync_core::domain::{RowData, Table};
use salesync_sync::{WriteError, WriterSettings};

use crate::common::{row, Harness};

fn payouts(count: usize) -> Vec<RowData> {
    (1..=count)
        .map(|i| row(json!({"id": format!("PO-{i}"), "amount": 10.0 * i as f64})))
        .collect()
}

#[tokio::test]
async fn test_customer_identity_survives_resync() {
    let h = Harness::new().await;
    let writer = h.writer();

    let first = writer
        .upsert(
            Table::Customers,
            vec![row(json!({"external_id": "C-1", "email": "old@example.com"}))],
            "id",
        )
        .await
        .unwrap();
    let internal = first.identities["C-1"].clone();

    let second = writer
        .upsert(
            Table::Customers,
            vec![row(json!({"external_id": "C-1", "email": "new@example.com"}))],
            "id",
        )
        .await
        .unwrap();

    assert_eq!(second.identities["C-1"], internal);
    assert_eq!(h.rows.count(Table::Customers).await, 1);
    let stored = h.rows.get(Table::Customers, "external_id", "C-1").await;
    assert_eq!(stored[0]["id"], json!(internal));
    assert_eq!(stored[0]["email"], json!("new@example.com"));
}

#[tokio::test]
async fn test_duplicate_external_ids_in_one_call_share_an_id() {
    let h = Harness::new().await;

    let report = h
        .writer()
        .upsert(
            Table::Products,
            vec![
                row(json!({"external_id": "P-1", "name": "Course"})),
                row(json!({"external_id": "P-1", "name": "Course v2"})),
            ],
            "id",
        )
        .await
        .unwrap();

    assert_eq!(report.identities.len(), 1);
    assert_eq!(h.rows.count(Table::Products).await, 1);
    let stored = h.rows.get(Table::Products, "external_id", "P-1").await;
    assert_eq!(stored[0]["name"], json!("Course v2"));
}

#[tokio::test]
async fn test_rows_are_split_into_batches() {
    let h = Harness::new().await;
    let writer = h.writer_with(WriterSettings {
        batch_size: 2,
        budget: Duration::from_secs(10),
    });

    let report = writer.upsert(Table::Payouts, payouts(5), "id").await.unwrap();

    assert_eq!(report.affected, 5);
    assert_eq!(h.rows.upsert_batches(Table::Payouts), 3);
    assert_eq!(h.rows.count(Table::Payouts).await, 5);
}

#[tokio::test]
async fn test_zero_budget_writes_nothing() {
    let h = Harness::new().await;
    let writer = h.writer_with(WriterSettings {
        batch_size: 2,
        budget: Duration::ZERO,
    });

    let err = writer
        .upsert(Table::Payouts, payouts(3), "id")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WriteError::BudgetExhausted {
            written: 0,
            total: 3,
            ..
        }
    ));
    assert_eq!(h.rows.count(Table::Payouts).await, 0);
}

#[tokio::test]
async fn test_budget_keeps_completed_batches() {
    let h = Harness::new().await;
    h.rows.set_upsert_delay(Duration::from_millis(200));
    let writer = h.writer_with(WriterSettings {
        batch_size: 2,
        budget: Duration::from_millis(150),
    });

    let err = writer
        .upsert(Table::Payouts, payouts(5), "id")
        .await
        .unwrap_err();

    match err {
        WriteError::BudgetExhausted { written, total, .. } => {
            assert_eq!(written, 2);
            assert_eq!(total, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.rows.count(Table::Payouts).await, 2);
}

#[tokio::test]
async fn test_placeholder_ids_are_dropped() {
    let h = Harness::new().await;

    let report = h
        .writer()
        .upsert(
            Table::Payouts,
            vec![
                row(json!({"id": "PO-1"})),
                row(json!({"id": "undefined"})),
                row(json!({"id": ""})),
                row(json!({"amount": 5.0})),
            ],
            "id",
        )
        .await
        .unwrap();

    assert_eq!(report.affected, 1);
    assert_eq!(report.dropped, 3);
    assert_eq!(h.rows.count(Table::Payouts).await, 1);
}

#[tokio::test]
async fn test_sale_with_unknown_customer_fails() {
    let h = Harness::new().await;

    let err = h
        .writer()
        .upsert(
            Table::Sales,
            vec![row(json!({"id": "S-1", "customer_id": "no-such-customer"}))],
            "id",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WriteError::Store { table: "sales", .. }));
    assert_eq!(h.rows.count(Table::Sales).await, 0);
}

#[tokio::test]
async fn test_empty_input_touches_nothing() {
    let h = Harness::new().await;

    let report = h.writer().upsert(Table::Sales, Vec::new(), "id").await.unwrap();

    assert_eq!(report.affected, 0);
    assert!(h.rows.calls().is_empty());
}
