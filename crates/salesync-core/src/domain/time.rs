//! Timestamp normalization
//!
//! Upstream payloads carry instants as RFC 3339 strings with or without
//! fractional seconds, as naive `YYYY-MM-DD HH:MM:SS` strings, or as epoch
//! numbers in seconds or milliseconds. Everything is normalized to one
//! canonical form (`2024-01-01T10:00:00.000Z`) so that two payloads naming
//! the same instant compare equal. Unparsable values normalize to `None`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Epoch values above this are taken to be milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parses an instant from any supported JSON representation
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_instant_str(s),
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

/// Parses an instant from a string representation
pub fn parse_instant_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc());
    }
    raw.parse::<i64>().ok().and_then(from_epoch)
}

/// Canonical string form of an instant, or `None` if unparsable
pub fn normalize_instant(value: &Value) -> Option<String> {
    parse_instant(value).map(format_instant)
}

/// Canonical string form of a string instant, or `None` if unparsable
pub fn normalize_instant_str(raw: &str) -> Option<String> {
    parse_instant_str(raw).map(format_instant)
}

/// Formats an instant in the canonical form used for storage and comparison
pub fn format_instant(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.abs() >= EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}
