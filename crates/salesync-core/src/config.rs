//! Configuration module for salesync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, environment overrides, validation, defaults, and a builder
//! pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for salesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub writer: WriterConfig,
    pub webhook: WebhookConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Upstream platform endpoints and client credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the REST API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// OAuth2 token endpoint.
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    /// Tenant/account identifier sent with every API call.
    pub account_id: Option<String>,
    /// Header carrying `account_id`.
    pub account_header: String,
}

/// Retry, timeout and token refresh policy for upstream calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound for a single call; the remaining deadline may shorten it.
    pub call_timeout_ms: u64,
    /// Retries after the first attempt for transient statuses and transport errors.
    pub max_retries: u32,
    /// Linear backoff step per attempt.
    pub backoff_step_ms: u64,
    /// Backoff ceiling.
    pub backoff_cap_ms: u64,
    /// A cached token is refreshed this long before it expires.
    pub token_refresh_buffer_secs: u64,
}

/// Resumable sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Wall-clock budget of one sync invocation.
    pub budget_ms: u64,
    pub page_size: u32,
    /// Length of the rolling window used by default runs.
    pub rolling_window_days: u32,
    /// How long an unsupported resource is skipped before it is probed again.
    pub support_recheck_hours: u64,
    /// Seconds between daemon sync ticks.
    pub tick_interval_secs: u64,
}

/// Batched upsert writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub batch_size: usize,
    /// Time budget of one `upsert` call across all its batches.
    pub budget_ms: u64,
}

/// Inbound webhook endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Socket address the daemon listens on.
    pub bind: String,
    pub max_body_bytes: usize,
}

/// Local database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com/v1".to_string(),
            token_url: "https://api.example.com/oauth/token".to_string(),
            client_id: None,
            client_secret: None,
            scope: None,
            account_id: None,
            account_header: "X-Account-Id".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 8_000,
            max_retries: 3,
            backoff_step_ms: 400,
            backoff_cap_ms: 800,
            token_refresh_buffer_secs: 60,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            budget_ms: 25_000,
            page_size: 100,
            rolling_window_days: 90,
            support_recheck_hours: 24,
            tick_interval_secs: 300,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            budget_ms: 15_000,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("salesync")
                .join("salesync.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/salesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("salesync")
            .join("config.yaml")
    }

    /// Applies `SALESYNC_*` environment variables on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let up = &mut self.upstream;

        if let Some(v) = get("SALESYNC_CLIENT_ID") {
            up.client_id = Some(v);
        }
        if let Some(v) = get("SALESYNC_CLIENT_SECRET") {
            up.client_secret = Some(v);
        }
        if let Some(v) = get("SALESYNC_SCOPE") {
            up.scope = Some(v);
        }
        if let Some(v) = get("SALESYNC_ACCOUNT_ID") {
            up.account_id = Some(v);
        }
        if let Some(v) = get("SALESYNC_BASE_URL") {
            up.base_url = v;
        }
        if let Some(v) = get("SALESYNC_TOKEN_URL") {
            up.token_url = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Configuration problems that make an operation impossible.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing credential: {0} is not configured")]
    MissingCredential(&'static str),
}

/// The client-credentials tuple used to obtain a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

impl UpstreamConfig {
    /// Returns the configured credentials, or a configuration error if
    /// either the client id or secret is missing.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let client_id =
            non_empty(&self.client_id).ok_or(ConfigError::MissingCredential("upstream.client_id"))?;
        let client_secret = non_empty(&self.client_secret)
            .ok_or(ConfigError::MissingCredential("upstream.client_secret"))?;
        Ok(Credentials {
            client_id,
            client_secret,
            scope: non_empty(&self.scope),
        })
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Missing
    /// credentials are not reported here; they only matter once a token
    /// is requested.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ValidationError {
                field: field.into(),
                message: message.into(),
            });
        };

        // --- upstream ---
        for (field, url) in [
            ("upstream.base_url", &self.upstream.base_url),
            ("upstream.token_url", &self.upstream.token_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                push(field, "must be an http(s) URL");
            }
        }
        if self.upstream.account_header.trim().is_empty() {
            push("upstream.account_header", "must not be empty");
        }

        // --- http ---
        if self.http.call_timeout_ms == 0 {
            push("http.call_timeout_ms", "must be greater than 0");
        }
        if self.http.backoff_cap_ms < self.http.backoff_step_ms {
            push("http.backoff_cap_ms", "must be at least http.backoff_step_ms");
        }

        // --- sync ---
        if self.sync.budget_ms == 0 {
            push("sync.budget_ms", "must be greater than 0");
        }
        if self.sync.page_size == 0 || self.sync.page_size > 500 {
            push("sync.page_size", "must be between 1 and 500");
        }
        if self.sync.rolling_window_days == 0 {
            push("sync.rolling_window_days", "must be greater than 0");
        }
        if self.sync.tick_interval_secs == 0 {
            push("sync.tick_interval_secs", "must be greater than 0");
        }

        // --- writer ---
        if self.writer.batch_size == 0 {
            push("writer.batch_size", "must be greater than 0");
        }
        if self.writer.budget_ms == 0 {
            push("writer.budget_ms", "must be greater than 0");
        }

        // --- webhook ---
        if self.webhook.bind.parse::<std::net::SocketAddr>().is_err() {
            push("webhook.bind", "must be a socket address such as 127.0.0.1:8787");
        }
        if self.webhook.max_body_bytes == 0 {
            push("webhook.max_body_bytes", "must be greater than 0");
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                &format!("must be one of: {}", VALID_LOG_LEVELS.join(", ")),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], mostly used by tests.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- upstream ---

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream.base_url = url.into();
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream.token_url = url.into();
        self
    }

    pub fn credentials(mut self, client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.upstream.client_id = Some(client_id.into());
        self.config.upstream.client_secret = Some(secret.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.upstream.scope = Some(scope.into());
        self
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.config.upstream.account_id = Some(account_id.into());
        self
    }

    // --- http ---

    pub fn call_timeout_ms(mut self, ms: u64) -> Self {
        self.config.http.call_timeout_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.http.max_retries = n;
        self
    }

    pub fn backoff(mut self, step_ms: u64, cap_ms: u64) -> Self {
        self.config.http.backoff_step_ms = step_ms;
        self.config.http.backoff_cap_ms = cap_ms;
        self
    }

    // --- sync ---

    pub fn sync_budget_ms(mut self, ms: u64) -> Self {
        self.config.sync.budget_ms = ms;
        self
    }

    pub fn page_size(mut self, n: u32) -> Self {
        self.config.sync.page_size = n;
        self
    }

    // --- writer ---

    pub fn writer_batch_size(mut self, n: usize) -> Self {
        self.config.writer.batch_size = n;
        self
    }

    pub fn writer_budget_ms(mut self, ms: u64) -> Self {
        self.config.writer.budget_ms = ms;
        self
    }

    // --- misc ---

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database.path = path.into();
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
