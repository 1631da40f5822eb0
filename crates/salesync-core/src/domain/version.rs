//! Entity snapshots and sale lifecycle events
//!
//! Both record kinds are append-only. [`SaleState`] is the narrow
//! projection of a stored sale used to decide whether a webhook changed
//! anything worth versioning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::rows::RowData;
use super::time::{format_instant, normalize_instant};

/// Sale statuses whose transitions move aggregate figures
pub const METRIC_STATUSES: [&str; 5] = ["approved", "paid", "refunded", "rejected", "canceled"];

/// Entity kinds that receive version snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Sale,
    Product,
    Customer,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Sale => "sale",
            EntityKind::Product => "product",
            EntityKind::Customer => "customer",
        }
    }
}

/// An immutable snapshot of an entity at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct EntityVersion {
    pub entity_type: EntityKind,
    pub entity_id: String,
    /// 1-based, monotonic per entity
    pub version: i64,
    pub data: RowData,
    pub changed_at: DateTime<Utc>,
}

impl EntityVersion {
    pub fn to_row(&self) -> RowData {
        let mut row = RowData::new();
        row.insert("entity_type".into(), json!(self.entity_type.as_str()));
        row.insert("entity_id".into(), json!(self.entity_id));
        row.insert("version".into(), json!(self.version));
        row.insert("data".into(), Value::Object(self.data.clone()));
        row.insert("changed_at".into(), json!(format_instant(self.changed_at)));
        row
    }
}

/// A sale status transition, kept with the raw payload that caused it
#[derive(Debug, Clone, PartialEq)]
pub struct SaleEvent {
    pub sale_id: String,
    /// The new status
    pub event_type: String,
    pub at: DateTime<Utc>,
    pub meta: Value,
}

impl SaleEvent {
    pub fn to_row(&self) -> RowData {
        let mut row = RowData::new();
        row.insert("sale_id".into(), json!(self.sale_id));
        row.insert("type".into(), json!(self.event_type));
        row.insert("at".into(), json!(format_instant(self.at)));
        row.insert("meta".into(), self.meta.clone());
        row
    }
}

/// The `{status, paid_at}` projection of a sale
///
/// Both fields are normalized on construction: status is lower-cased and
/// trimmed, `paid_at` is canonicalized and unparsable values become `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleState {
    pub status: Option<String>,
    pub paid_at: Option<String>,
}

impl SaleState {
    pub fn from_row(row: &RowData) -> Self {
        let status = row
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let paid_at = row.get("paid_at").and_then(normalize_instant);
        Self { status, paid_at }
    }

    pub fn status_changed(&self, next: &SaleState) -> bool {
        self.status != next.status
    }

    pub fn paid_at_changed(&self, next: &SaleState) -> bool {
        self.paid_at != next.paid_at
    }

    pub fn is_metric_status(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| METRIC_STATUSES.contains(&s))
    }

    /// Whether moving from `self` to `next` enters or leaves the metric set
    pub fn crosses_metric_boundary(&self, next: &SaleState) -> bool {
        self.status_changed(next) && (self.is_metric_status() || next.is_metric_status())
    }
}
