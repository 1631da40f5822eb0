//! SQLite pool setup
//!
//! File databases run in WAL mode so the webhook endpoint can read while a
//! sync invocation writes. Foreign keys are always on: `sales.customer_id`
//! references `customers(id)`. The schema is applied on every open and is
//! idempotent (`CREATE ... IF NOT EXISTS`).

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::StoreError;

const SCHEMA: &str = include_str!("migrations/0001_initial.sql");

/// Connections for a file database; the sync loop and the webhook
/// handlers rarely need more
const FILE_POOL_SIZE: u32 = 5;

/// Write contention between a sync page and a webhook delivery waits this long
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the `sqlx` pool every store adapter is built on
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database file at `db_path`
    ///
    /// # Errors
    ///
    /// [`StoreError::ConnectionFailed`] when the directory or file cannot be
    /// opened, [`StoreError::MigrationFailed`] when the schema cannot be
    /// applied.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                StoreError::ConnectionFailed(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display()))
            })?;

        apply_schema(&pool).await?;
        tracing::info!(path = %db_path.display(), "Database ready");

        Ok(Self { pool })
    }

    /// A private in-memory database
    ///
    /// Limited to one connection: every SQLite connection to `:memory:`
    /// gets its own empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("in-memory database: {e}")))?;

        apply_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
    tracing::debug!("Schema applied");
    Ok(())
}
