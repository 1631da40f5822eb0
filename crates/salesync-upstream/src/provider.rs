//! [`IPlatformApi`] adapter over [`UpstreamClient`]

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use salesync_core::ports::{IPlatformApi, ListQuery, PageFetch};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::UpstreamClient;
use crate::page::parse_page;
use crate::UpstreamError;

/// Fetches list pages and classifies the outcome for the sync engine
#[derive(Clone)]
pub struct PlatformApi {
    client: UpstreamClient,
}

impl PlatformApi {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }
}

fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
        || body.trim_start().starts_with('<')
}

#[async_trait]
impl IPlatformApi for PlatformApi {
    async fn list_page(
        &self,
        path: &str,
        query: &ListQuery,
        deadline: Instant,
    ) -> anyhow::Result<PageFetch> {
        let response = self.client.get(path, &query.to_params(), deadline).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(path, "Resource not found upstream");
            return Ok(PageFetch::Unsupported);
        }
        if !status.is_success() {
            return Ok(PageFetch::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(UpstreamError::from)?;

        if looks_like_html(content_type.as_deref(), &body) {
            warn!(path, "Upstream answered a list call with HTML");
            return Ok(PageFetch::Unsupported);
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::InvalidResponse(format!("{path}: {e}")))?;
        let page = parse_page(&json, query.page);
        debug!(
            path,
            page = query.page,
            items = page.items.len(),
            has_more = page.has_more,
            "Fetched list page"
        );
        Ok(PageFetch::Page(page))
    }
}
