//! SQLite implementation of IStateStore
//!
//! Each record is one row of `app_state`, holding a JSON document.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use salesync_core::ports::IStateStore;

use crate::StoreError;

/// Key/value store over the `app_state` table
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IStateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM app_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("read state '{key}': {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("value")?;
        let value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::SerializationError(format!("state '{key}': {e}")))?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO app_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("write state '{key}': {e}")))?;

        tracing::debug!(key, "State record saved");
        Ok(())
    }
}
