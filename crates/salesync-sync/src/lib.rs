//! Salesync Sync - Ingestion paths into the local store
//!
//! Provides:
//! - Batched, budgeted upserts with identity preservation for products and customers
//! - The fixed resource registry (path, range support, mapper)
//! - A resumable, cursor-driven bulk sync bounded by a wall-clock budget
//! - Idempotent webhook processing with change detection and entity versioning
//!
//! ## Modules
//!
//! - [`writer`] - Batched upsert writer
//! - [`resources`] - Resource registry and page mapping
//! - [`engine`] - Resumable sync engine
//! - [`webhook`] - Webhook event processor
//! - [`versioning`] - Entity snapshots and sale lifecycle events

pub mod engine;
pub mod resources;
pub mod versioning;
pub mod webhook;
pub mod writer;

use salesync_core::domain::{DomainError, ResourceName};
use thiserror::Error;

pub use engine::{SyncEngine, SyncRunReport, SyncSettings};
pub use resources::{registry, ResourceConfig};
pub use versioning::EntityVersioner;
pub use webhook::{EventKind, WebhookOutcome, WebhookProcessor};
pub use writer::{BatchedWriter, WriteReport, WriterSettings};

/// Errors raised by the batched writer
#[derive(Debug, Error)]
pub enum WriteError {
    /// The write-time budget ran out before every batch was written
    ///
    /// Batches written before this point stay committed.
    #[error("Write budget exhausted for {table} after {written} of {total} rows")]
    BudgetExhausted {
        table: &'static str,
        written: usize,
        total: usize,
    },

    /// The row store rejected a batch or a lookup
    #[error("Store error on {table}: {message}")]
    Store {
        table: &'static str,
        message: String,
    },
}

/// Errors that stop a sync invocation
///
/// These never escape [`SyncEngine::run`]; they end up in
/// [`SyncRunReport::error`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The cursor names a resource with no registered configuration
    #[error("No resource configuration for {0}")]
    MissingResource(ResourceName),

    /// The upstream answered a list call with a non-OK status
    #[error("{resource} page {page} returned HTTP {status}")]
    UpstreamStatus {
        resource: ResourceName,
        page: u32,
        status: u16,
    },

    /// The page request failed after retries
    #[error("Fetching {resource} page {page} failed: {message}")]
    Fetch {
        resource: ResourceName,
        page: u32,
        message: String,
    },

    /// Writing a page failed
    #[error("Writing {resource} failed: {source}")]
    Write {
        resource: ResourceName,
        #[source]
        source: WriteError,
    },

    /// Reading or saving a persisted state record failed
    #[error("State store error: {0}")]
    State(String),
}

/// Errors that fail a webhook delivery
///
/// Any of these means the event was not fully applied and must not be
/// acknowledged.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The payload lacks the entity id
    #[error("Invalid payload: {0}")]
    Mapping(#[from] DomainError),

    /// Upserting the entity (or the customer it references) failed
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Loading the previously stored state failed
    #[error("Failed to load stored {entity} {id}: {message}")]
    Load {
        entity: &'static str,
        id: String,
        message: String,
    },

    /// Writing a snapshot or lifecycle event failed
    #[error("Failed to record history for {entity} {id}: {message}")]
    Versioning {
        entity: &'static str,
        id: String,
        message: String,
    },
}
