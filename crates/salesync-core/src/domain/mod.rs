//! Domain entities and business logic
//!
//! This module contains the core domain types for salesync:
//! - Newtypes for validated identifiers and the fixed resource set
//! - The resumable sync cursor and its transition function
//! - Time interval resolution for sync requests
//! - Normalized entity rows and store table descriptors
//! - Entity version snapshots and sale lifecycle events
//! - Domain-specific error types

pub mod cursor;
pub mod errors;
pub mod interval;
pub mod newtypes;
pub mod rows;
pub mod support;
pub mod table;
pub mod time;
pub mod version;

// Re-export commonly used types
pub use cursor::{PageOutcome, SyncCursor};
pub use errors::DomainError;
pub use interval::{IntervalRange, SyncRequest};
pub use newtypes::{ExternalId, ResourceName};
pub use rows::{
    to_row, CouponRow, CustomerRow, EnrollmentRow, PayoutRow, ProductRow, RefundRow, RowData,
    SaleRow, SubscriptionRow,
};
pub use support::{ResourceSupport, SupportMap, SupportStatus};
pub use table::Table;
pub use version::{EntityKind, EntityVersion, SaleEvent, SaleState};
