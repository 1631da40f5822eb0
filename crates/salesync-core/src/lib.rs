//! Salesync Core - Domain logic for commerce data ingestion
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `SyncCursor`, `IntervalRange`, entity rows, `EntityVersion`
//! - **Mappers** - pure functions from upstream JSON shapes to normalized rows
//! - **Port definitions** - Traits for adapters: `IPlatformApi`, `IRowStore`, `IStateStore`, `Clock`
//! - **Configuration** - YAML-backed settings shared by the binaries
//!
//! # Architecture
//!
//! The domain module has no I/O. Ports define trait interfaces that the
//! upstream and store crates implement. The sync crate orchestrates
//! domain values through those ports.

pub mod config;
pub mod domain;
pub mod mappers;
pub mod ports;
