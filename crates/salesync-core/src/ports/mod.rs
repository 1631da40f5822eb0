//! Port definitions (hexagonal architecture interfaces)
//!
//! The ingestion core depends on these traits; their implementations live
//! in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IPlatformApi`] - Paginated list calls against the upstream platform
//! - [`IRowStore`] - Relational store with upsert-by-key and select
//! - [`IStateStore`] - Generic key/value store for cursor, token and support records
//! - [`Clock`] - Injected wall clock

pub mod clock;
pub mod platform;
pub mod row_store;
pub mod state_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use platform::{IPlatformApi, ListPage, ListQuery, PageFetch};
pub use row_store::IRowStore;
pub use state_store::{keys, IStateStore};
