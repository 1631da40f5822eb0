//! Webhook command - Apply a webhook payload from a file
//!
//! Runs the same processing as the daemon's endpoint, which makes it
//! useful for replaying a delivery the platform gave up on.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use salesync_core::config::Config;
use salesync_daemon::Stores;
use salesync_sync::WebhookOutcome;
use serde_json::Value;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct WebhookCommand {
    /// Event type as the platform names it, e.g. `sale.approved`
    pub event_type: String,

    /// JSON payload file
    pub file: PathBuf,
}

impl WebhookCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let raw = tokio::fs::read_to_string(&self.file)
            .await
            .with_context(|| format!("Failed to read {}", self.file.display()))?;

        let stores = Stores::open(config).await?;
        let outcome = apply(&stores, config, &self.event_type, &raw).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&outcome)?);
            return Ok(());
        }

        match (&outcome.entity, &outcome.entity_id) {
            (None, _) => formatter.warn(&format!(
                "Event type '{}' is not handled; nothing was applied",
                self.event_type
            )),
            (Some(entity), id) => {
                formatter.success(&format!(
                    "Applied {:?} {}",
                    entity,
                    id.as_deref().unwrap_or("-")
                ));
                if let Some(version) = outcome.version {
                    formatter.info(&format!("Recorded version {version}"));
                }
                formatter.info(&format!(
                    "Metrics changed: {}",
                    if outcome.metrics_changed { "yes" } else { "no" }
                ));
            }
        }

        Ok(())
    }
}

/// Parses `raw` and runs it through the webhook processor
pub async fn apply(
    stores: &Stores,
    config: &Config,
    event_type: &str,
    raw: &str,
) -> Result<WebhookOutcome> {
    let payload: Value = serde_json::from_str(raw).context("Payload is not valid JSON")?;
    let outcome = stores
        .processor(config)
        .process(event_type, &payload, raw)
        .await?;
    Ok(outcome)
}
