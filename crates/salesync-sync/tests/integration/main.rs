//! Integration tests for salesync-sync
//!
//! Runs the writer, the sync engine and the webhook processor against an
//! in-memory SQLite store, a scripted upstream and an in-memory state store.

mod common;

mod test_engine;
mod test_writer;
