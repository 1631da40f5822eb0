//! Resumable sync cursor
//!
//! A [`SyncCursor`] names the exact `(resource, interval, page)` a sync
//! invocation should fetch next. Exactly one cursor exists per deployment;
//! it is persisted after every successful page and reloaded by the next
//! invocation.
//!
//! ## Transitions
//!
//! ```text
//! page fetched, more pages   ──→ same resource/interval, page = next page
//! page fetched, no more      ──→ next interval of the same resource, page 1
//!                            ──→ next resource, interval 0, page 1
//!                            ──→ first resource, done = true (cycle complete)
//! ```
//!
//! Transitions are pure so they can be tested without network or storage.

use serde::{Deserialize, Serialize};

use super::newtypes::ResourceName;

/// Outcome of a successfully processed page, as seen by the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The upstream reported more pages for the current interval
    More {
        /// Page number to fetch next (from `next_page` or `page + 1`)
        next_page: u32,
    },
    /// The current interval of the current resource is exhausted
    Exhausted,
}

/// Persisted pointer identifying where a resumable sync continues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    /// Resource currently being walked
    pub resource: ResourceName,
    /// 1-based page number within the current interval
    pub page: u32,
    /// Index into the interval list resolved for the current request
    pub interval_index: usize,
    /// True once a full pass over every resource and interval completed
    pub done: bool,
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::initial()
    }
}

impl SyncCursor {
    /// The cursor a brand-new deployment starts from
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            resource: ResourceName::first(),
            page: 1,
            interval_index: 0,
            done: false,
        }
    }

    /// Begins a new cycle if the previous one completed
    ///
    /// A completed cursor is left parked on the first resource with
    /// `done = true`; the next invocation flips it back to `false`.
    #[must_use]
    pub fn resume(self) -> Self {
        if self.done {
            Self::initial()
        } else {
            self
        }
    }

    /// Applies a page outcome and returns the next cursor
    ///
    /// `interval_count` is the number of intervals the current resource is
    /// walked over (1 for resources without date-range support).
    #[must_use]
    pub fn advance(self, outcome: PageOutcome, interval_count: usize) -> Self {
        match outcome {
            PageOutcome::More { next_page } => {
                // Never move backwards or stay in place: a stale next_page
                // would otherwise refetch the same page forever.
                let page = if next_page > self.page {
                    next_page
                } else {
                    self.page + 1
                };
                Self { page, ..self }
            }
            PageOutcome::Exhausted => {
                if self.interval_index + 1 < interval_count {
                    Self {
                        page: 1,
                        interval_index: self.interval_index + 1,
                        ..self
                    }
                } else {
                    self.next_resource()
                }
            }
        }
    }

    /// Moves past the current resource regardless of page or interval
    #[must_use]
    pub fn next_resource(self) -> Self {
        match self.resource.next() {
            Some(resource) => Self {
                resource,
                page: 1,
                interval_index: 0,
                done: false,
            },
            None => Self {
                done: true,
                ..Self::initial()
            },
        }
    }

    /// Restarts the current resource at its first interval and page
    #[must_use]
    pub fn restart_resource(self) -> Self {
        Self {
            page: 1,
            interval_index: 0,
            ..self
        }
    }

    /// Ordering key over `(resource, interval, page)` within a cycle
    #[must_use]
    pub fn position(&self) -> (usize, usize, u32) {
        let resource_idx = ResourceName::ALL
            .iter()
            .position(|r| *r == self.resource)
            .unwrap_or(0);
        (resource_idx, self.interval_index, self.page)
    }
}
