//! Batched upsert writer
//!
//! [`BatchedWriter::upsert`] splits rows into fixed-size batches and writes
//! them one after the other. Before each batch it checks a write-time
//! budget that starts when the call starts; once the budget is spent the
//! call fails, and batches already written stay written. Only idempotent
//! upserts go through here, so a retried call converges.
//!
//! ## Identity preservation
//!
//! Products and customers have an internal `id` distinct from the upstream
//! `external_id`. Before writing, every row's external id is resolved
//! against stored rows: a known external id gets its existing internal id,
//! an unknown one gets a fresh UUID. The same upstream entity therefore
//! never receives two internal ids, and sales referencing a customer stay
//! valid across re-syncs.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use salesync_core::config::WriterConfig;
use salesync_core::domain::{ExternalId, RowData, Table};
use salesync_core::ports::IRowStore;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::WriteError;

/// Store error fragments that point at a write into an identity column
const IDENTITY_FAILURE_MARKERS: &[&str] = &[
    "non-default value",
    "generated always",
    "identity column",
    "datatype mismatch",
    "unique constraint failed: customers.external_id",
];

// ============================================================================
// Settings and report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
    pub batch_size: usize,
    /// Time allowed for one `upsert` call, across all its batches
    pub budget: Duration,
}

impl WriterSettings {
    pub fn from_config(config: &WriterConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            budget: Duration::from_millis(config.budget_ms),
        }
    }
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self::from_config(&WriterConfig::default())
    }
}

/// Result of a successful upsert call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Rows the store reported as inserted or updated
    pub affected: u64,
    /// Rows skipped because their key was not a usable id
    pub dropped: usize,
    /// External id to internal id, for identity-preserving tables
    pub identities: HashMap<String, String>,
}

// ============================================================================
// BatchedWriter
// ============================================================================

/// Writes mapped rows through [`IRowStore`] in bounded batches
#[derive(Clone)]
pub struct BatchedWriter {
    store: Arc<dyn IRowStore>,
    settings: WriterSettings,
}

impl BatchedWriter {
    pub fn new(store: Arc<dyn IRowStore>, settings: WriterSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn IRowStore> {
        &self.store
    }

    pub fn settings(&self) -> WriterSettings {
        self.settings
    }

    /// Upserts `rows` into `table`, keyed by `conflict_key`
    ///
    /// # Errors
    ///
    /// [`WriteError::BudgetExhausted`] when the budget runs out between
    /// batches, [`WriteError::Store`] when the store rejects a batch.
    pub async fn upsert(
        &self,
        table: Table,
        rows: Vec<RowData>,
        conflict_key: &str,
    ) -> Result<WriteReport, WriteError> {
        if rows.is_empty() {
            return Ok(WriteReport::default());
        }
        let deadline = Instant::now() + self.settings.budget;

        let key_column = if table.preserves_identity() {
            "external_id"
        } else {
            conflict_key
        };
        let (rows, dropped) = retain_writable(rows, key_column);
        if dropped > 0 {
            warn!(table = %table, dropped, "Dropped rows without a usable id");
        }

        let mut identities = HashMap::new();
        let rows = if table.preserves_identity() {
            let (rows, resolved) = self.preserve_identity(table, rows).await?;
            identities = resolved;
            rows
        } else {
            rows
        };

        let total = rows.len();
        let mut written = 0;
        let mut affected = 0;

        for batch in rows.chunks(self.settings.batch_size.max(1)) {
            if Instant::now() >= deadline {
                warn!(table = %table, written, total, "Write budget exhausted");
                return Err(WriteError::BudgetExhausted {
                    table: table.as_str(),
                    written,
                    total,
                });
            }

            match self.store.upsert(table, batch, conflict_key).await {
                Ok(n) => affected += n,
                Err(e) => {
                    if table == Table::Customers {
                        log_customer_failure(batch, &e);
                    }
                    return Err(WriteError::Store {
                        table: table.as_str(),
                        message: format!("{e:#}"),
                    });
                }
            }
            written += batch.len();
        }

        debug!(table = %table, rows = total, affected, "Rows written");
        Ok(WriteReport {
            affected,
            dropped,
            identities,
        })
    }

    /// Internal ids already stored for the given external ids
    pub async fn lookup_identities(
        &self,
        table: Table,
        external_ids: &[String],
    ) -> Result<HashMap<String, String>, WriteError> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let stored = self
            .store
            .select_by(table, "external_id", external_ids)
            .await
            .map_err(|e| WriteError::Store {
                table: table.as_str(),
                message: format!("{e:#}"),
            })?;

        Ok(stored
            .iter()
            .filter_map(|row| {
                let external = row.get("external_id")?.as_str()?;
                let internal = row.get("id")?.as_str()?;
                Some((external.to_string(), internal.to_string()))
            })
            .collect())
    }

    async fn preserve_identity(
        &self,
        table: Table,
        mut rows: Vec<RowData>,
    ) -> Result<(Vec<RowData>, HashMap<String, String>), WriteError> {
        let external_ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("external_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut identities = self.lookup_identities(table, &external_ids).await?;
        let known = identities.len();

        for row in &mut rows {
            let Some(external) = row
                .get("external_id")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            let id = identities
                .entry(external)
                .or_insert_with(|| {
                    row.get("id")
                        .and_then(Value::as_str)
                        .filter(|id| !id.trim().is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| Uuid::new_v4().to_string())
                })
                .clone();
            row.insert("id".to_string(), Value::String(id));
        }

        debug!(
            table = %table,
            existing = known,
            minted = identities.len() - known,
            "Resolved internal ids"
        );
        Ok((rows, identities))
    }
}

/// Keeps rows whose `key_column` holds a usable id, normalizing it in place
fn retain_writable(rows: Vec<RowData>, key_column: &str) -> (Vec<RowData>, usize) {
    let before = rows.len();
    let kept: Vec<RowData> = rows
        .into_iter()
        .filter_map(|mut row| {
            let id = row.get(key_column).and_then(ExternalId::from_value)?;
            row.insert(key_column.to_string(), Value::String(id.into()));
            Some(row)
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

fn is_identity_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    IDENTITY_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

fn log_customer_failure(batch: &[RowData], err: &anyhow::Error) {
    let message = format!("{err:#}");
    let ids: Vec<&str> = batch
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_str))
        .collect();
    let external_ids: Vec<&str> = batch
        .iter()
        .filter_map(|row| row.get("external_id").and_then(Value::as_str))
        .collect();
    let identity_column = is_identity_failure(&message);

    error!(
        table = "customers",
        ?ids,
        ?external_ids,
        identity_column,
        error = %message,
        "Customer upsert failed"
    );
    if identity_column {
        error!(
            "Customer write touched an identity column; internal ids must come from \
             the stored row for the same external_id"
        );
    }
}
