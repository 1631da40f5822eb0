//! Resource mappers
//!
//! Pure functions from upstream JSON to normalized rows. The upstream is
//! inconsistent about field names across resources and API versions, so
//! every field is read through an ordered list of candidate paths and the
//! first non-null match wins.
//!
//! Mappers fail only when the entity's own id is missing; every other field
//! is optional.

mod catalog;
mod finance;
mod people;
mod sale;

pub use catalog::{map_coupon, map_product};
pub use finance::{map_payout, map_refund};
pub use people::{map_customer, map_enrollment, map_subscription};
pub use sale::{customer_from_sale, map_sale};

use serde_json::Value;

use crate::domain::time::normalize_instant;
use crate::domain::{DomainError, ExternalId};

/// Returns the entity object, unwrapping a `{"data": {...}}` envelope
pub fn unwrap_envelope(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(inner @ Value::Object(_)) => inner,
        _ => payload,
    }
}

/// Resolves a dotted path (`"customer.email"`) against a JSON value
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.get(key))
        .filter(|v| !v.is_null())
}

/// First non-null value among `paths`
pub(crate) fn pick<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(value, path))
}

pub(crate) fn pick_str(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn pick_f64(value: &Value, paths: &[&str]) -> Option<f64> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn pick_i64(value: &Value, paths: &[&str]) -> Option<i64> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn pick_bool(value: &Value, paths: &[&str]) -> Option<bool> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "active" => Some(true),
            "false" | "0" | "no" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Canonical instant from the first parsable candidate
pub(crate) fn pick_instant(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(value, path).and_then(normalize_instant))
}

/// Lower-cased status string
pub(crate) fn pick_status(value: &Value, paths: &[&str]) -> Option<String> {
    pick_str(value, paths).map(|s| s.to_lowercase())
}

pub(crate) fn pick_id(value: &Value, paths: &[&str]) -> Option<ExternalId> {
    paths
        .iter()
        .find_map(|path| lookup(value, path).and_then(ExternalId::from_value))
}

/// Like [`pick_id`] but returns the plain string, for reference columns
pub(crate) fn pick_ref(value: &Value, paths: &[&str]) -> Option<String> {
    pick_id(value, paths).map(String::from)
}

pub(crate) fn require_id(
    value: &Value,
    paths: &[&str],
    entity: &str,
) -> Result<ExternalId, DomainError> {
    pick_id(value, paths).ok_or_else(|| DomainError::MissingField {
        entity: entity.to_string(),
        field: "id".to_string(),
    })
}
