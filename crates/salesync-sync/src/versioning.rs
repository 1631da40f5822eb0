//! Entity snapshots and sale lifecycle events
//!
//! Both tables are append-only. A snapshot's version is the entity's
//! current maximum plus one; the `(entity_type, entity_id, version)` unique
//! index makes a concurrent writer that computed the same number fail
//! instead of silently duplicating a version.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use salesync_core::domain::{EntityKind, EntityVersion, RowData, SaleEvent, Table};
use salesync_core::ports::IRowStore;
use tracing::debug;

#[derive(Clone)]
pub struct EntityVersioner {
    store: Arc<dyn IRowStore>,
}

impl EntityVersioner {
    pub fn new(store: Arc<dyn IRowStore>) -> Self {
        Self { store }
    }

    /// Appends a snapshot of `data` and returns its version number
    pub async fn record(
        &self,
        entity_type: EntityKind,
        entity_id: &str,
        data: RowData,
        changed_at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let current = self.store.max_version(entity_type, entity_id).await?;
        let snapshot = EntityVersion {
            entity_type,
            entity_id: entity_id.to_string(),
            version: current.unwrap_or(0) + 1,
            data,
            changed_at,
        };
        self.store
            .insert(Table::EntityVersions, &[snapshot.to_row()])
            .await?;

        debug!(
            entity_type = entity_type.as_str(),
            entity_id,
            version = snapshot.version,
            "Entity version recorded"
        );
        Ok(snapshot.version)
    }

    pub async fn append_sale_event(&self, event: &SaleEvent) -> anyhow::Result<()> {
        self.store.insert(Table::SaleEvents, &[event.to_row()]).await?;
        debug!(sale_id = %event.sale_id, event_type = %event.event_type, "Sale event appended");
        Ok(())
    }
}
