//! Status command - Display persisted sync state
//!
//! Shows where the next sync invocation resumes, which resources the
//! upstream account exposes, when the cached token expires, and how many
//! rows each table holds. Nothing here needs upstream credentials.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use clap::Args;
use salesync_core::config::Config;
use salesync_core::domain::{ResourceName, ResourceSupport, SupportMap, SyncCursor, Table};
use salesync_core::ports::{keys, IStateStore};
use salesync_daemon::Stores;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

/// Everything `salesync status` reports
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// None before the first invocation or when the record is unreadable
    pub cursor: Option<SyncCursor>,
    pub resources: BTreeMap<ResourceName, ResourceSupport>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub rows: BTreeMap<&'static str, i64>,
}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let stores = Stores::open(config).await?;
        let report = gather(&stores).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&report)?);
            return Ok(());
        }

        match &report.cursor {
            Some(cursor) if cursor.done => {
                formatter.success("Last sync cycle completed; the next run starts over")
            }
            Some(cursor) => formatter.success(&format!(
                "Sync resumes at {} page {} (interval {})",
                cursor.resource, cursor.page, cursor.interval_index
            )),
            None => formatter.warn("No sync has run yet"),
        }

        formatter.info("");
        formatter.info("Resources:");
        for (resource, support) in &report.resources {
            formatter.info(&format!("  {}", support_line(*resource, support)));
        }

        formatter.info("");
        match report.token_expires_at {
            Some(expires_at) => formatter.info(&format!(
                "Token: expires {}",
                expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            None => formatter.info("Token: none cached"),
        }

        formatter.info("");
        formatter.info("Rows:");
        for (table, count) in &report.rows {
            formatter.info(&format!("  {table:<16} {count}"));
        }

        Ok(())
    }
}

/// Reads the persisted state and counts rows
pub async fn gather(stores: &Stores) -> Result<StatusReport> {
    let cursor = match stores.state.get(keys::SYNC_CURSOR).await? {
        Some(value) => match serde_json::from_value::<SyncCursor>(value) {
            Ok(cursor) => Some(cursor),
            Err(e) => {
                warn!(error = %e, "Stored sync cursor is unreadable");
                None
            }
        },
        None => None,
    };

    let support: SupportMap = stores
        .state
        .get(keys::RESOURCE_SUPPORT)
        .await?
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    let resources = ResourceName::ALL
        .iter()
        .map(|resource| (*resource, support.get(*resource)))
        .collect();

    let token_expires_at = stores
        .state
        .get(keys::OAUTH_TOKEN)
        .await?
        .as_ref()
        .and_then(token_expiry);

    let mut rows = BTreeMap::new();
    for table in Table::ALL {
        rows.insert(table.as_str(), stores.rows.count(table).await?);
    }

    Ok(StatusReport {
        cursor,
        resources,
        token_expires_at,
        rows,
    })
}

/// Expiry of a persisted token record; the token itself is never shown
fn token_expiry(record: &Value) -> Option<DateTime<Utc>> {
    let millis = record.get("expires_at")?.as_i64()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn support_line(resource: ResourceName, support: &ResourceSupport) -> String {
    let status = serde_json::to_value(support.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    match support.checked_at {
        Some(checked_at) => format!(
            "{:<14} {status} (checked {})",
            resource.as_str(),
            checked_at.format("%Y-%m-%d %H:%M")
        ),
        None => format!("{:<14} {status}", resource.as_str()),
    }
}
