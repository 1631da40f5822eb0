//! Salesync Store - Local persistence
//!
//! SQLite-based storage for:
//! - Ingested entity rows (products, customers, sales, ...)
//! - Append-only entity version snapshots and sale lifecycle events
//! - Singleton state records (sync cursor, cached token, resource support)
//!
//! ## Architecture
//!
//! This crate implements the `IRowStore` and `IStateStore` ports from
//! `salesync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteRowStore`] - Column-whitelisted upserts, inserts and selects
//! - [`SqliteStateStore`] - JSON key/value records
//! - [`StoreError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use salesync_store::{DatabasePool, SqliteRowStore, SqliteStateStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/salesync/salesync.db")).await?;
//! let rows = SqliteRowStore::new(pool.pool().clone());
//! let state = SqliteStateStore::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod rows;
pub mod state;

pub use pool::DatabasePool;
pub use rows::SqliteRowStore;
pub use state::SqliteStateStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A column name outside the table's schema was requested
    #[error("Unknown column '{column}' for table {table}")]
    UnknownColumn {
        table: &'static str,
        column: String,
    },

    /// Serialization or deserialization of a stored value failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}
