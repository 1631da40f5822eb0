//! Upstream platform port (driven/secondary port)
//!
//! The sync engine only needs one operation from the upstream: fetch a
//! single page of a list resource before a deadline. Authentication,
//! retries and response-shape probing are the adapter's business.
//!
//! ## Design Notes
//!
//! - Non-OK statuses are returned as [`PageFetch::Status`] rather than as
//!   errors; the engine decides what a status means for the cursor.
//! - A 404 or an HTML body is reported as [`PageFetch::Unsupported`].
//! - Transport failures that survive the retry policy surface as `Err`.

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::domain::IntervalRange;

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    /// Date filter, only for range-capable resources
    pub range: Option<IntervalRange>,
}

impl ListQuery {
    /// Query-string pairs in the upstream's parameter names
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page_number", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(range) = &self.range {
            params.push(("start_date", range.start_param()));
            params.push(("end_date", range.end_param()));
        }
        params
    }
}

/// A parsed list page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub has_more: bool,
    /// Page number to request next, when the upstream names one
    pub next_page: Option<u32>,
}

/// Result of a page request that reached the upstream
#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    Page(ListPage),
    /// Any non-OK status other than "not supported"
    Status(u16),
    /// The account does not expose this resource
    Unsupported,
}

#[async_trait]
pub trait IPlatformApi: Send + Sync {
    /// Fetches one page of `path`, giving up at `deadline`
    async fn list_page(
        &self,
        path: &str,
        query: &ListQuery,
        deadline: Instant,
    ) -> anyhow::Result<PageFetch>;
}
