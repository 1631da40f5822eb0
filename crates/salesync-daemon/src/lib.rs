//! Salesync Daemon - process wiring shared by `salesyncd` and the CLI
//!
//! ## Modules
//!
//! - [`bootstrap`] - Configuration loading and adapter construction
//! - [`logging`] - `tracing-subscriber` initialisation
//! - [`server`] - Inbound webhook HTTP endpoint

pub mod bootstrap;
pub mod logging;
pub mod server;

pub use bootstrap::{load_config, Stores};
pub use server::WebhookServer;
