//! Webhook event processor
//!
//! Applies one inbound event to the store. Every write is an idempotent
//! upsert, so a redelivered event converges to the same state. The only
//! output is whether aggregate metrics may have changed.
//!
//! ## Sale events
//!
//! ```text
//! map sale ──→ upsert embedded customer ──→ load previous {status, paid_at}
//!          ──→ upsert sale ──→ snapshot (new / status / paid_at changed)
//!          ──→ lifecycle event (status changed)
//! ```
//!
//! The customer is written before the sale because the sale row references
//! it by internal id. Events for the same entity are serialized through a
//! per-key lock so the "load previous, then write" comparison cannot
//! interleave within a process; across processes the unique version index
//! rejects the loser, which then fails and is redelivered.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use salesync_core::domain::{
    to_row, CustomerRow, EntityKind, RowData, SaleEvent, SaleRow, SaleState, Table,
};
use salesync_core::mappers;
use salesync_core::ports::Clock;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::resources::link_customers;
use crate::versioning::EntityVersioner;
use crate::writer::BatchedWriter;
use crate::WebhookError;

// ============================================================================
// Event classification
// ============================================================================

/// Entity an event type refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sale,
    Product,
    Customer,
    Subscription,
    Enrollment,
    Coupon,
    Refund,
    Payout,
}

/// Substrings identifying each kind, checked in this order
///
/// Sales come first so that `sale.refunded` is a sale status change, not a
/// refund record.
const EVENT_PATTERNS: &[(EventKind, &[&str])] = &[
    (EventKind::Sale, &["sale", "order", "purchase"]),
    (EventKind::Subscription, &["subscription"]),
    (EventKind::Enrollment, &["enrollment"]),
    (EventKind::Product, &["product"]),
    (EventKind::Customer, &["customer"]),
    (EventKind::Coupon, &["coupon"]),
    (EventKind::Refund, &["refund"]),
    (EventKind::Payout, &["payout"]),
];

impl EventKind {
    /// Classifies an upstream event type; unknown types yield `None`
    pub fn classify(event_type: &str) -> Option<Self> {
        let normalized = event_type.trim().to_lowercase();
        EVENT_PATTERNS
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| normalized.contains(n)))
            .map(|(kind, _)| *kind)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Sale => "sale",
            EventKind::Product => "product",
            EventKind::Customer => "customer",
            EventKind::Subscription => "subscription",
            EventKind::Enrollment => "enrollment",
            EventKind::Coupon => "coupon",
            EventKind::Refund => "refund",
            EventKind::Payout => "payout",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a processed event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    /// Whether downstream aggregates should be recomputed
    pub metrics_changed: bool,
    /// `None` for event types this processor does not handle
    pub entity: Option<EventKind>,
    pub entity_id: Option<String>,
    /// Snapshot version written for this event, if any
    pub version: Option<i64>,
}

impl WebhookOutcome {
    fn ignored() -> Self {
        Self::default()
    }
}

// ============================================================================
// WebhookProcessor
// ============================================================================

pub struct WebhookProcessor {
    writer: BatchedWriter,
    versioner: EntityVersioner,
    clock: Arc<dyn Clock>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WebhookProcessor {
    pub fn new(writer: BatchedWriter, clock: Arc<dyn Clock>) -> Self {
        let versioner = EntityVersioner::new(writer.store().clone());
        Self {
            writer,
            versioner,
            clock,
            locks: DashMap::new(),
        }
    }

    /// Applies one event
    ///
    /// `raw_payload` is the body as received; it is kept on sale lifecycle
    /// events for auditing.
    ///
    /// # Errors
    ///
    /// Any error means the event was not fully applied and must not be
    /// acknowledged.
    #[tracing::instrument(skip(self, payload, raw_payload))]
    pub async fn process(
        &self,
        event_type: &str,
        payload: &Value,
        raw_payload: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(kind) = EventKind::classify(event_type) else {
            info!(event_type, "Ignoring unhandled event type");
            return Ok(WebhookOutcome::ignored());
        };

        match kind {
            EventKind::Sale => self.process_sale(payload, raw_payload).await,
            EventKind::Product => {
                let row = mappers::map_product(payload)?;
                self.upsert_versioned(kind, Table::Products, EntityKind::Product, to_row(&row))
                    .await
            }
            EventKind::Customer => {
                let row = mappers::map_customer(payload)?;
                self.upsert_versioned(kind, Table::Customers, EntityKind::Customer, to_row(&row))
                    .await
            }
            EventKind::Subscription => {
                let row = mappers::map_subscription(payload)?;
                self.upsert_plain(kind, Table::Subscriptions, to_row(&row)).await
            }
            EventKind::Enrollment => {
                let row = mappers::map_enrollment(payload)?;
                self.upsert_plain(kind, Table::Enrollments, to_row(&row)).await
            }
            EventKind::Coupon => {
                let row = mappers::map_coupon(payload)?;
                self.upsert_plain(kind, Table::Coupons, to_row(&row)).await
            }
            EventKind::Refund => {
                let row = mappers::map_refund(payload)?;
                self.upsert_plain(kind, Table::Refunds, to_row(&row)).await
            }
            EventKind::Payout => {
                let row = mappers::map_payout(payload)?;
                self.upsert_plain(kind, Table::Payouts, to_row(&row)).await
            }
        }
    }

    async fn process_sale(
        &self,
        payload: &Value,
        raw_payload: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let sale = mappers::map_sale(payload)?;
        let customer = mappers::customer_from_sale(payload);
        let sale_id = sale.id.to_string();

        self.serialized(
            EventKind::Sale,
            &sale_id,
            self.apply_sale(sale, customer, raw_payload),
        )
        .await
    }

    async fn apply_sale(
        &self,
        sale: SaleRow,
        customer: Option<CustomerRow>,
        raw_payload: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let sale_id = sale.id.to_string();

        // Same lock as a customer event, so the two never mint competing ids
        let mut identities = match customer {
            Some(customer) => {
                let external_id = customer.external_id.to_string();
                self.serialized(
                    EventKind::Customer,
                    &external_id,
                    self.writer
                        .upsert(Table::Customers, vec![to_row(&customer)], "id"),
                )
                .await?
                .identities
            }
            None => HashMap::new(),
        };
        if let Some(external) = &sale.customer_external_id {
            if !identities.contains_key(external) {
                let known = self
                    .writer
                    .lookup_identities(Table::Customers, std::slice::from_ref(external))
                    .await?;
                identities.extend(known);
            }
        }

        let previous = self.load_sale_state(&sale_id).await?;

        let mut rows = vec![to_row(&sale)];
        link_customers(&mut rows, &identities);
        self.writer.upsert(Table::Sales, rows.clone(), "id").await?;
        let mut row = rows.remove(0);

        let is_new = previous.is_none();
        let previous = previous.unwrap_or_default();
        let mut next = SaleState::from_row(&row);
        // A payload without a status leaves the stored one in place
        if next.status.is_none() {
            if let Some(status) = &previous.status {
                next.status = Some(status.clone());
                row.insert("status".to_string(), Value::String(status.clone()));
            }
        }
        let status_changed = previous.status_changed(&next);
        let paid_at_changed = previous.paid_at_changed(&next);
        let now = self.clock.now();

        let version = if is_new || status_changed || paid_at_changed {
            Some(self.snapshot(EntityKind::Sale, &sale_id, row, now).await?)
        } else {
            None
        };

        if status_changed {
            let event = SaleEvent {
                sale_id: sale_id.clone(),
                event_type: next.status.clone().unwrap_or_else(|| "unknown".to_string()),
                at: now,
                meta: json!({
                    "from": previous.status,
                    "to": next.status,
                    "raw": raw_value(raw_payload),
                }),
            };
            self.versioner
                .append_sale_event(&event)
                .await
                .map_err(|e| versioning_error("sale", &sale_id, e))?;
        }

        // A status change between two non-metric statuses is versioned but
        // leaves aggregates alone.
        let metrics_changed =
            is_new || paid_at_changed || previous.crosses_metric_boundary(&next);

        debug!(
            sale_id,
            is_new,
            status_changed,
            paid_at_changed,
            metrics_changed,
            "Sale event applied"
        );

        Ok(WebhookOutcome {
            metrics_changed,
            entity: Some(EventKind::Sale),
            entity_id: Some(sale_id),
            version,
        })
    }

    /// Upserts an identity-preserving entity and snapshots it unconditionally
    async fn upsert_versioned(
        &self,
        kind: EventKind,
        table: Table,
        entity: EntityKind,
        row: RowData,
    ) -> Result<WebhookOutcome, WebhookError> {
        let external_id = row
            .get("external_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let work = async {
            let mut row = row;
            let report = self.writer.upsert(table, vec![row.clone()], "id").await?;
            if let Some(internal) = report.identities.get(&external_id) {
                row.insert("id".to_string(), Value::String(internal.clone()));
            }
            self.snapshot(entity, &external_id, row, self.clock.now()).await
        };
        let version = self.serialized(kind, &external_id, work).await?;

        Ok(WebhookOutcome {
            metrics_changed: false,
            entity: Some(kind),
            entity_id: Some(external_id),
            version: Some(version),
        })
    }

    async fn upsert_plain(
        &self,
        kind: EventKind,
        table: Table,
        row: RowData,
    ) -> Result<WebhookOutcome, WebhookError> {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.serialized(kind, &id, self.writer.upsert(table, vec![row], "id"))
            .await?;

        Ok(WebhookOutcome {
            metrics_changed: kind == EventKind::Refund,
            entity: Some(kind),
            entity_id: Some(id),
            version: None,
        })
    }

    async fn load_sale_state(&self, sale_id: &str) -> Result<Option<SaleState>, WebhookError> {
        let stored = self
            .writer
            .store()
            .select_by(Table::Sales, "id", &[sale_id.to_string()])
            .await
            .map_err(|e| WebhookError::Load {
                entity: "sale",
                id: sale_id.to_string(),
                message: format!("{e:#}"),
            })?;
        Ok(stored.first().map(SaleState::from_row))
    }

    async fn snapshot(
        &self,
        entity: EntityKind,
        entity_id: &str,
        data: RowData,
        at: DateTime<Utc>,
    ) -> Result<i64, WebhookError> {
        self.versioner
            .record(entity, entity_id, data, at)
            .await
            .map_err(|e| versioning_error(entity.as_str(), entity_id, e))
    }

    // ========================================================================
    // Per-entity serialization
    // ========================================================================

    /// Runs `work` while holding the lock for `(kind, id)`
    async fn serialized<T>(&self, kind: EventKind, id: &str, work: impl Future<Output = T>) -> T {
        let key = lock_key(kind, id);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            work.await
        };

        drop(lock);
        self.locks
            .remove_if(&key, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    /// Number of entities with an event in flight
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

fn lock_key(kind: EventKind, id: &str) -> String {
    format!("{kind}:{id}")
}

fn raw_value(raw_payload: &str) -> Value {
    serde_json::from_str(raw_payload).unwrap_or_else(|_| Value::String(raw_payload.to_string()))
}

fn versioning_error(entity: &'static str, id: &str, err: anyhow::Error) -> WebhookError {
    WebhookError::Versioning {
        entity,
        id: id.to_string(),
        message: format!("{err:#}"),
    }
}
