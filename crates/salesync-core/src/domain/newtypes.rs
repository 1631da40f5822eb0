//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for upstream identifiers
//! and the fixed set of resources the platform exposes. Each newtype
//! ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;

// ============================================================================
// ExternalId
// ============================================================================

/// Placeholder strings that upstream payloads use in place of a missing id
const PLACEHOLDER_IDS: &[&str] = &["null", "undefined"];

/// An identifier assigned by the upstream platform
///
/// External ids are trimmed on construction. Empty strings, whitespace and
/// the literal placeholders `"null"` / `"undefined"` are rejected so an
/// entity without a usable id is never treated as writable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId(String);

impl ExternalId {
    /// Create a new ExternalId with validation
    pub fn new(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty()
            || PLACEHOLDER_IDS
                .iter()
                .any(|p| trimmed.eq_ignore_ascii_case(p))
        {
            return Err(DomainError::InvalidExternalId(raw.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Extract an ExternalId from a JSON value
    ///
    /// Strings and numbers are accepted; anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::new(s).ok(),
            Value::Number(n) => Self::new(n.to_string()).ok(),
            _ => None,
        }
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ExternalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ExternalId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        id.0
    }
}

// ============================================================================
// ResourceName
// ============================================================================

/// The fixed set of upstream list resources, in sync order
///
/// The order of [`ResourceName::ALL`] is the order in which a sync cycle
/// walks the resources. Products come first so sales referencing them
/// land after the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceName {
    Products,
    Customers,
    Sales,
    Subscriptions,
    Enrollments,
    Coupons,
    Refunds,
    Payouts,
}

impl ResourceName {
    /// Every resource in sync order
    pub const ALL: [ResourceName; 8] = [
        ResourceName::Products,
        ResourceName::Customers,
        ResourceName::Sales,
        ResourceName::Subscriptions,
        ResourceName::Enrollments,
        ResourceName::Coupons,
        ResourceName::Refunds,
        ResourceName::Payouts,
    ];

    /// The first resource of a cycle
    #[must_use]
    pub const fn first() -> Self {
        ResourceName::Products
    }

    /// The resource after this one, or `None` for the last resource
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|r| *r == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Returns the wire/storage name of the resource
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceName::Products => "products",
            ResourceName::Customers => "customers",
            ResourceName::Sales => "sales",
            ResourceName::Subscriptions => "subscriptions",
            ResourceName::Enrollments => "enrollments",
            ResourceName::Coupons => "coupons",
            ResourceName::Refunds => "refunds",
            ResourceName::Payouts => "payouts",
        }
    }
}

impl Display for ResourceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::UnknownResource(s.to_string()))
    }
}
