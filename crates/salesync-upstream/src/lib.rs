//! Salesync Upstream - client for the e-commerce platform's REST API
//!
//! Provides:
//! - OAuth2 client-credentials token acquisition with single-flight refresh
//! - A retry layer bounded by a caller deadline
//! - Tolerant parsing of paginated list responses
//!
//! ## Modules
//!
//! - [`auth`] - Token manager (cache, single-flight, persistence)
//! - [`client`] - Authenticated HTTP calls with timeout, retry and re-auth
//! - [`page`] - Ordered extraction strategies for list pages
//! - [`provider`] - [`IPlatformApi`](salesync_core::ports::IPlatformApi) adapter

pub mod auth;
pub mod client;
pub mod page;
pub mod provider;

use salesync_core::config::ConfigError;
use thiserror::Error;

/// Errors that can occur when talking to the upstream platform
///
/// `Clone` so that one failed token refresh can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Credentials or endpoints are not configured
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The token endpoint rejected the client-credentials grant
    #[error("Token request failed ({status}): {message}")]
    TokenRejected {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Message extracted from the error body
        message: String,
    },

    /// The token endpoint answered 2xx without a usable token
    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// A single call exceeded its timeout
    #[error("Request timed out")]
    Timeout,

    /// The caller's deadline passed before a call could be made
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// A network-level error (DNS, connection reset, TLS)
    #[error("Network error: {0}")]
    Transport(String),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}
