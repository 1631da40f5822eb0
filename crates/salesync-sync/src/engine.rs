//! Resumable sync engine
//!
//! The [`SyncEngine`] walks `resource × interval × page` one page at a
//! time, driven by the persisted [`SyncCursor`]. Each invocation runs until
//! its budget is spent or a full cycle completes, so it can be re-invoked
//! by an external scheduler as often as needed.
//!
//! ## Iteration
//!
//! 1. Look up the cursor's resource; a missing configuration ends the run
//! 2. Skip resources marked unsupported until their recheck window passes
//! 3. Fetch the page with the run's deadline
//! 4. Non-OK status or fetch error: stop, keep the cursor (the page is retried next run)
//! 5. 404/HTML: mark the resource unsupported and move past it
//! 6. Map and write the items, customers first
//! 7. Advance and persist the cursor
//!
//! A page is only "consumed" once its rows are written and the cursor that
//! points past it is saved. A crash between the two re-processes the page,
//! which the idempotent upserts tolerate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use salesync_core::config::SyncConfig;
use salesync_core::domain::{
    IntervalRange, PageOutcome, ResourceName, SupportMap, SupportStatus, SyncCursor, SyncRequest,
};
use salesync_core::ports::{keys, Clock, IPlatformApi, IStateStore, ListPage, ListQuery, PageFetch};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::resources::{registry, ResourceConfig};
use crate::writer::BatchedWriter;
use crate::SyncError;

/// Upper bound for the support recheck window (about a century)
const MAX_RECHECK_HOURS: u64 = 876_000;

// ============================================================================
// Settings and report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub page_size: u32,
    pub rolling_window_days: u32,
    /// How long an unsupported resource is skipped before it is probed again
    pub support_recheck: ChronoDuration,
    /// Default per-invocation budget
    pub budget: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        let recheck_hours = config.support_recheck_hours.min(MAX_RECHECK_HOURS) as i64;
        Self {
            page_size: config.page_size.max(1),
            rolling_window_days: config.rolling_window_days,
            support_recheck: ChronoDuration::hours(recheck_hours),
            budget: Duration::from_millis(config.budget_ms),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Outcome of one sync invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunReport {
    /// False when the run stopped on an error
    pub ok: bool,
    /// True when a full cycle completed in this run
    pub done: bool,
    /// Where the next invocation resumes
    pub cursor: SyncCursor,
    pub pages_fetched: u32,
    pub rows_fetched: u64,
    /// Rows actually inserted or updated, per resource
    pub rows_written: BTreeMap<ResourceName, u64>,
    pub error: Option<String>,
}

impl SyncRunReport {
    fn new(cursor: SyncCursor) -> Self {
        Self {
            ok: true,
            done: false,
            cursor,
            pages_fetched: 0,
            rows_fetched: 0,
            rows_written: BTreeMap::new(),
            error: None,
        }
    }

    fn fail(&mut self, err: SyncError) {
        error!(error = %err, cursor = ?self.cursor, "Sync run stopped");
        self.ok = false;
        self.error = Some(err.to_string());
    }
}

/// What one loop iteration did with the cursor
enum Step {
    /// The cursor moved; keep going
    Advanced(SyncCursor),
    /// The run must stop with the cursor unchanged
    Stop(SyncError),
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Cursor-driven bulk synchronization over the fixed resource set
///
/// ## Dependencies
///
/// - `api`: paginated list calls (`IPlatformApi`)
/// - `state`: persisted cursor and resource support map (`IStateStore`)
/// - `writer`: batched upserts into the row store
/// - `clock`: wall clock for interval resolution and support rechecks
pub struct SyncEngine {
    api: Arc<dyn IPlatformApi>,
    state: Arc<dyn IStateStore>,
    writer: BatchedWriter,
    clock: Arc<dyn Clock>,
    resources: Vec<ResourceConfig>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn IPlatformApi>,
        state: Arc<dyn IStateStore>,
        writer: BatchedWriter,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            api,
            state,
            writer,
            clock,
            resources: registry().to_vec(),
            settings,
        }
    }

    /// Replaces the resource registry
    pub fn with_resources(mut self, resources: Vec<ResourceConfig>) -> Self {
        self.resources = resources;
        self
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Runs with the configured default budget
    pub async fn run_default(&self, request: &SyncRequest) -> SyncRunReport {
        self.run(request, self.settings.budget).await
    }

    /// Runs one invocation bounded by `budget`
    ///
    /// Never fails: errors end the run and are reported with the cursor the
    /// next invocation will resume from.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, request: &SyncRequest, budget: Duration) -> SyncRunReport {
        let deadline = Instant::now() + budget;

        let mut cursor = match self.load_cursor().await {
            Ok(cursor) => cursor.resume(),
            Err(err) => {
                let mut report = SyncRunReport::new(SyncCursor::initial());
                report.fail(err);
                return report;
            }
        };
        let mut support = self.load_support().await;
        let intervals = request.resolve(self.clock.now(), self.settings.rolling_window_days);
        let mut report = SyncRunReport::new(cursor);

        info!(
            resource = %cursor.resource,
            page = cursor.page,
            interval = cursor.interval_index,
            intervals = intervals.len(),
            budget_ms = budget.as_millis() as u64,
            "Starting sync run"
        );

        loop {
            if Instant::now() >= deadline {
                info!(resource = %cursor.resource, page = cursor.page, "Sync budget exhausted");
                break;
            }

            match self
                .step(cursor, &intervals, &mut support, deadline, &mut report)
                .await
            {
                Step::Advanced(next) => {
                    if let Err(err) = self.save_cursor(next).await {
                        report.fail(err);
                        break;
                    }
                    cursor = next;
                    report.cursor = next;
                    if next.done {
                        report.done = true;
                        info!("Sync cycle complete");
                        break;
                    }
                }
                Step::Stop(err) => {
                    report.fail(err);
                    break;
                }
            }
        }

        info!(
            ok = report.ok,
            done = report.done,
            pages = report.pages_fetched,
            rows_fetched = report.rows_fetched,
            "Sync run finished"
        );
        report
    }

    /// Processes the unit of work `cursor` points at
    async fn step(
        &self,
        cursor: SyncCursor,
        intervals: &[IntervalRange],
        support: &mut SupportMap,
        deadline: Instant,
        report: &mut SyncRunReport,
    ) -> Step {
        let Some(config) = self.resources.iter().find(|c| c.name == cursor.resource) else {
            return Step::Stop(SyncError::MissingResource(cursor.resource));
        };

        let interval_count = config.interval_count(intervals.len());
        let cursor = if cursor.interval_index >= interval_count {
            debug!(
                resource = %cursor.resource,
                interval = cursor.interval_index,
                interval_count,
                "Cursor interval outside this request, restarting resource"
            );
            cursor.restart_resource()
        } else {
            cursor
        };

        let now = self.clock.now();
        if !support.should_attempt(cursor.resource, now, self.settings.support_recheck) {
            debug!(resource = %cursor.resource, "Skipping unsupported resource");
            return Step::Advanced(cursor.next_resource());
        }

        let query = ListQuery {
            page: cursor.page,
            page_size: self.settings.page_size,
            range: config
                .supports_range
                .then(|| intervals.get(cursor.interval_index).copied())
                .flatten(),
        };

        let fetch = match self.api.list_page(config.path, &query, deadline).await {
            Ok(fetch) => fetch,
            Err(e) => {
                return Step::Stop(SyncError::Fetch {
                    resource: cursor.resource,
                    page: cursor.page,
                    message: format!("{e:#}"),
                })
            }
        };

        let page = match fetch {
            PageFetch::Page(page) => page,
            PageFetch::Status(status) => {
                return Step::Stop(SyncError::UpstreamStatus {
                    resource: cursor.resource,
                    page: cursor.page,
                    status,
                })
            }
            PageFetch::Unsupported => {
                warn!(resource = %cursor.resource, "Resource not supported by this account");
                // Saved even without a status change so the recheck window restarts
                support.mark(cursor.resource, SupportStatus::Unsupported, now);
                self.save_support(support).await;
                return Step::Advanced(cursor.next_resource());
            }
        };

        if support.mark(cursor.resource, SupportStatus::Supported, now) {
            self.save_support(support).await;
        }

        report.pages_fetched += 1;
        report.rows_fetched += page.items.len() as u64;

        let mapped = config.map_items(&page.items);
        if !mapped.is_empty() {
            match config.write(&self.writer, mapped).await {
                Ok(affected) if affected > 0 => {
                    *report.rows_written.entry(cursor.resource).or_default() += affected;
                }
                Ok(_) => {}
                Err(source) => {
                    return Step::Stop(SyncError::Write {
                        resource: cursor.resource,
                        source,
                    })
                }
            }
        }

        debug!(
            resource = %cursor.resource,
            interval = cursor.interval_index,
            page = cursor.page,
            items = page.items.len(),
            has_more = page.has_more,
            "Page processed"
        );

        Step::Advanced(cursor.advance(page_outcome(&page, cursor.page), interval_count))
    }

    // ========================================================================
    // Persisted state
    // ========================================================================

    /// Loads the persisted cursor, or the initial one if none is stored
    pub async fn load_cursor(&self) -> Result<SyncCursor, SyncError> {
        let stored = self
            .state
            .get(keys::SYNC_CURSOR)
            .await
            .map_err(|e| SyncError::State(format!("load cursor: {e:#}")))?;

        Ok(match stored {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "Stored cursor is unreadable, starting over");
                SyncCursor::initial()
            }),
            None => SyncCursor::initial(),
        })
    }

    async fn save_cursor(&self, cursor: SyncCursor) -> Result<(), SyncError> {
        let value = serde_json::to_value(cursor)
            .map_err(|e| SyncError::State(format!("encode cursor: {e}")))?;
        self.state
            .set(keys::SYNC_CURSOR, &value)
            .await
            .map_err(|e| SyncError::State(format!("save cursor: {e:#}")))
    }

    /// Loads the resource support map; an unreadable record counts as empty
    pub async fn load_support(&self) -> SupportMap {
        match self.state.get(keys::RESOURCE_SUPPORT).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(None) => SupportMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load resource support, assuming unknown");
                SupportMap::new()
            }
        }
    }

    /// Saving support is best effort: losing it only costs a re-probe
    async fn save_support(&self, support: &SupportMap) {
        let result = match serde_json::to_value(support) {
            Ok(value) => self.state.set(keys::RESOURCE_SUPPORT, &value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to save resource support");
        }
    }
}

/// Maps a parsed page onto the cursor transition it implies
fn page_outcome(page: &ListPage, current: u32) -> PageOutcome {
    if page.has_more {
        PageOutcome::More {
            next_page: page.next_page.unwrap_or(current + 1),
        }
    } else {
        PageOutcome::Exhausted
    }
}
