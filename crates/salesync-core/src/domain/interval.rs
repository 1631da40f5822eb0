//! Time interval resolution for sync requests
//!
//! A sync invocation walks each range-capable resource over one or more
//! [`IntervalRange`]s. Which intervals apply depends on the request kind:
//!
//! | Request   | Intervals                                        |
//! |-----------|--------------------------------------------------|
//! | `Full`    | `[epoch, now]`                                   |
//! | `Range`   | exactly the caller-supplied bounds               |
//! | `Default` | rolling window (90 days) and "today", both to now |

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A closed time window used as `start_date`/`end_date` filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl IntervalRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Start bound formatted as an ISO-8601 query value
    pub fn start_param(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// End bound formatted as an ISO-8601 query value
    pub fn end_param(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// What window of upstream history a sync invocation should cover
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SyncRequest {
    /// Rolling window plus a same-day refresh window
    #[default]
    Default,
    /// Complete resync from the epoch
    Full,
    /// Caller-supplied bounds, as raw date strings
    Range { start: String, end: String },
}

impl SyncRequest {
    /// Resolves the request into its ordered interval list
    ///
    /// Malformed range bounds fall back to `now`, which yields a
    /// zero-width interval rather than an error.
    pub fn resolve(&self, now: DateTime<Utc>, rolling_window_days: u32) -> Vec<IntervalRange> {
        match self {
            SyncRequest::Full => vec![IntervalRange::new(DateTime::<Utc>::default(), now)],
            SyncRequest::Range { start, end } => {
                let start = parse_bound(start).unwrap_or(now);
                let end = parse_bound(end).unwrap_or(now);
                vec![IntervalRange::new(start, end)]
            }
            SyncRequest::Default => {
                let rolling = now - Duration::days(i64::from(rolling_window_days));
                let today = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|midnight| midnight.and_utc())
                    .unwrap_or(now);
                vec![IntervalRange::new(rolling, now), IntervalRange::new(today, now)]
            }
        }
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
fn parse_bound(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}
