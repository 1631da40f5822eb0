//! Per-resource support status
//!
//! Some accounts do not have access to every list resource. The upstream
//! answers those with a 404 or an HTML error page, which costs a full call
//! timeout each time. The sync engine records the outcome here and skips
//! unsupported resources until a recheck window elapses.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ResourceName;

/// Whether the upstream account exposes a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    Supported,
    Unsupported,
    #[default]
    Unknown,
}

/// Last observed support status of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceSupport {
    pub status: SupportStatus,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Support status of every resource, persisted as one record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupportMap(BTreeMap<ResourceName, ResourceSupport>);

impl SupportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: ResourceName) -> ResourceSupport {
        self.0.get(&resource).copied().unwrap_or_default()
    }

    /// Whether the sync loop should request `resource` at `now`
    ///
    /// Supported and unknown resources are always attempted. Unsupported
    /// ones are attempted again once `recheck_after` has passed.
    pub fn should_attempt(
        &self,
        resource: ResourceName,
        now: DateTime<Utc>,
        recheck_after: Duration,
    ) -> bool {
        let entry = self.get(resource);
        match (entry.status, entry.checked_at) {
            (SupportStatus::Unsupported, Some(checked_at)) => now - checked_at >= recheck_after,
            _ => true,
        }
    }

    /// Records a status; returns true when the stored entry changed status
    pub fn mark(&mut self, resource: ResourceName, status: SupportStatus, now: DateTime<Utc>) -> bool {
        let previous = self.get(resource).status;
        self.0.insert(
            resource,
            ResourceSupport {
                status,
                checked_at: Some(now),
            },
        );
        previous != status
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceName, ResourceSupport)> + '_ {
        self.0.iter().map(|(r, s)| (*r, *s))
    }
}
