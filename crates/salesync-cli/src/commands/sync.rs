//! Sync command - Run one sync invocation
//!
//! Provides the `salesync sync` CLI command which:
//! 1. Opens the database and builds the sync engine
//! 2. Resolves the requested window (default, full, or explicit range)
//! 3. Runs the engine within the wall-clock budget
//! 4. Reports pages, rows and the cursor the next invocation resumes from

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use salesync_core::config::Config;
use salesync_core::domain::SyncRequest;
use salesync_daemon::Stores;
use salesync_sync::SyncRunReport;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Resync the complete history instead of the rolling window
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub full: bool,

    /// Start of an explicit range
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// End of an explicit range
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Wall-clock budget in milliseconds (defaults to sync.budget_ms)
    #[arg(long)]
    pub budget_ms: Option<u64>,
}

impl SyncCommand {
    /// The window this invocation asks for
    pub fn request(&self) -> SyncRequest {
        if self.full {
            return SyncRequest::Full;
        }
        match (&self.from, &self.to) {
            (Some(start), Some(end)) => SyncRequest::Range {
                start: start.clone(),
                end: end.clone(),
            },
            _ => SyncRequest::Default,
        }
    }

    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let stores = Stores::open(config).await?;
        let engine = stores.engine(config)?;

        let request = self.request();
        let budget = Duration::from_millis(self.budget_ms.unwrap_or(config.sync.budget_ms));
        info!(?request, budget_ms = budget.as_millis() as u64, "Running sync");

        let report = engine.run(&request, budget).await;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&report)?);
        } else {
            if report.ok {
                formatter.success(if report.done {
                    "Sync cycle complete"
                } else {
                    "Sync invocation finished; the next one resumes the cycle"
                });
            }
            for line in summary_lines(&report) {
                formatter.info(&line);
            }
        }

        match report.error {
            Some(error) if !report.ok => anyhow::bail!("Sync stopped early: {error}"),
            _ => Ok(()),
        }
    }
}

/// Human-readable summary of a run
fn summary_lines(report: &SyncRunReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Pages fetched: {}, rows fetched: {}",
        report.pages_fetched, report.rows_fetched
    )];

    for (resource, written) in &report.rows_written {
        lines.push(format!("  {:<14} {written} rows written", resource.as_str()));
    }

    let cursor = &report.cursor;
    if cursor.done {
        lines.push("Next run starts a new cycle".to_string());
    } else {
        lines.push(format!(
            "Next run resumes at {} page {} (interval {})",
            cursor.resource, cursor.page, cursor.interval_index
        ));
    }

    lines
}
