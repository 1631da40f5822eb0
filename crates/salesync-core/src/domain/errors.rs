//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including identifier validation and unknown resource names.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An upstream external identifier was empty or a placeholder value
    #[error("Invalid external id: {0:?}")]
    InvalidExternalId(String),

    /// A resource name outside the fixed resource set
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// A table name outside the known schema
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A required field was missing from an upstream payload
    #[error("Missing field '{field}' in {entity} payload")]
    MissingField {
        /// Entity being mapped (e.g. "sale")
        entity: String,
        /// Name of the missing field
        field: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
