//! Authenticated upstream HTTP client with retry policy
//!
//! Every call made through [`UpstreamClient::request`] is measured against
//! a caller-supplied deadline:
//!
//! - each attempt's timeout is `min(call_timeout, deadline - now)`
//! - a 401/403 forces one token refresh and one retry; a second one is
//!   returned to the caller as-is
//! - 408/429/500/502/503/504 and transport failures are retried up to
//!   `max_retries` times with a capped linear backoff, never sleeping past
//!   the deadline
//! - every other status is returned for the caller to interpret
//!
//! ## Usage
//!
//! ```rust,no_run
//! use salesync_upstream::client::UpstreamClient;
//! use tokio::time::{Duration, Instant};
//!
//! # async fn example(client: UpstreamClient) -> anyhow::Result<()> {
//! let deadline = Instant::now() + Duration::from_secs(20);
//! let response = client.get("/sales", &[("page_number", "1".into())], deadline).await?;
//! println!("status {}", response.status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, Response, StatusCode};
use salesync_core::config::{Config, HttpConfig};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::auth::TokenManager;
use crate::UpstreamError;

/// Statuses worth retrying: the upstream may answer differently next time
const TRANSIENT_STATUSES: [StatusCode; 6] = [
    StatusCode::REQUEST_TIMEOUT,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

// ============================================================================
// RetryPolicy
// ============================================================================

/// Timeout and retry parameters for upstream calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff_step: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(http: &HttpConfig) -> Self {
        Self {
            call_timeout: Duration::from_millis(http.call_timeout_ms),
            max_retries: http.max_retries,
            backoff_step: Duration::from_millis(http.backoff_step_ms),
            backoff_cap: Duration::from_millis(http.backoff_cap_ms),
        }
    }

    /// Sleep before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step
            .saturating_mul(attempt)
            .min(self.backoff_cap)
    }

    /// Timeout for an attempt starting now, or `None` once the deadline passed
    pub fn attempt_timeout(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| self.call_timeout.min(remaining))
    }
}

fn is_transient(status: StatusCode) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

// ============================================================================
// UpstreamClient
// ============================================================================

/// HTTP client for the upstream REST API
#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    account_header: String,
    account_id: Option<String>,
    tokens: TokenManager,
    policy: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(http: Client, base_url: impl Into<String>, tokens: TokenManager) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_header: "X-Account-Id".to_string(),
            account_id: None,
            tokens,
            policy: RetryPolicy::default(),
        }
    }

    /// Builds a client from configuration
    pub fn from_config(http: Client, config: &Config, tokens: TokenManager) -> Self {
        let mut client = Self::new(http, &config.upstream.base_url, tokens)
            .with_policy(RetryPolicy::from_config(&config.http));
        client.account_header = config.upstream.account_header.clone();
        client.account_id = config.upstream.account_id.clone();
        client
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sends `account_id` in `header` with every call
    pub fn with_account(mut self, header: impl Into<String>, account_id: impl Into<String>) -> Self {
        self.account_header = header.into();
        self.account_id = Some(account_id.into());
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        deadline: Instant,
    ) -> Result<Response, UpstreamError> {
        self.request(Method::GET, path, query, deadline).await
    }

    /// Sends a request under the retry policy and returns the final response
    ///
    /// Only transport failures and deadline exhaustion are errors; any HTTP
    /// status, including a final 401 or 503, comes back as a response.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        deadline: Instant,
    ) -> Result<Response, UpstreamError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut retries: u32 = 0;
        let mut reauthenticated = false;
        let mut force_refresh = false;

        loop {
            let timeout = self
                .policy
                .attempt_timeout(deadline)
                .ok_or(UpstreamError::DeadlineExceeded)?;
            let authorization = self.tokens.get_token(force_refresh).await?;
            force_refresh = false;

            let mut builder = self
                .http
                .request(method.clone(), &url)
                .query(query)
                .header(AUTHORIZATION, authorization)
                .header(ACCEPT, "application/json")
                .timeout(timeout);
            if let Some(account_id) = &self.account_id {
                builder = builder.header(self.account_header.as_str(), account_id.as_str());
            }

            debug!(%method, path, attempt = retries + 1, ?timeout, "Sending upstream request");

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if is_auth_failure(status) && !reauthenticated {
                        warn!(path, status = status.as_u16(), "Authorization failed, refreshing token");
                        reauthenticated = true;
                        force_refresh = true;
                        continue;
                    }

                    if is_transient(status)
                        && retries < self.policy.max_retries
                        && self.wait_before_retry(retries + 1, deadline).await
                    {
                        retries += 1;
                        warn!(path, status = status.as_u16(), retry = retries, "Transient upstream status");
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    let err = UpstreamError::from(err);
                    if retries < self.policy.max_retries
                        && self.wait_before_retry(retries + 1, deadline).await
                    {
                        retries += 1;
                        warn!(path, error = %err, retry = retries, "Upstream call failed");
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Sleeps the backoff for `attempt`; false if that would cross the deadline
    async fn wait_before_retry(&self, attempt: u32, deadline: Instant) -> bool {
        let delay = self.policy.backoff(attempt);
        if Instant::now() + delay >= deadline {
            debug!(attempt, "No time left for another attempt");
            return false;
        }
        tokio::time::sleep(delay).await;
        true
    }
}
