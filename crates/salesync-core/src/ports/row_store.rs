//! Relational row store port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Rows are column maps; adapters must ignore keys that are not columns
//!   of the target [`Table`].
//! - `upsert` is insert-or-update keyed by `conflict_key` and must be
//!   idempotent: callers re-apply the same rows after a crash.

use async_trait::async_trait;

use crate::domain::{EntityKind, RowData, Table};

#[async_trait]
pub trait IRowStore: Send + Sync {
    /// Inserts or updates `rows`, returning the number of rows affected
    async fn upsert(&self, table: Table, rows: &[RowData], conflict_key: &str)
        -> anyhow::Result<u64>;

    /// Appends `rows` to an append-only table
    async fn insert(&self, table: Table, rows: &[RowData]) -> anyhow::Result<u64>;

    /// Returns every row whose `column` equals one of `values`
    async fn select_by(
        &self,
        table: Table,
        column: &str,
        values: &[String],
    ) -> anyhow::Result<Vec<RowData>>;

    /// Highest snapshot version stored for an entity
    async fn max_version(&self, entity: EntityKind, entity_id: &str)
        -> anyhow::Result<Option<i64>>;
}
