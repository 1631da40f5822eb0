//! Adapter construction
//!
//! Opens the database once and builds whatever a process needs on top of
//! it. Only the sync engine and the token check need upstream credentials;
//! reading state and replaying webhooks work without them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use salesync_core::config::Config;
use salesync_core::ports::{Clock, IRowStore, IStateStore, SystemClock};
use salesync_store::{DatabasePool, SqliteRowStore, SqliteStateStore};
use salesync_sync::{BatchedWriter, SyncEngine, SyncSettings, WebhookProcessor, WriterSettings};
use salesync_upstream::auth::{TokenManager, TokenSettings};
use salesync_upstream::client::UpstreamClient;
use salesync_upstream::provider::PlatformApi;
use tracing::info;

/// Environment variable naming an alternate configuration file
pub const CONFIG_ENV: &str = "SALESYNC_CONFIG";

/// Loads the configuration and applies `SALESYNC_*` overrides
///
/// `path` wins over [`CONFIG_ENV`], which wins over the default location.
/// A missing file at the default location yields the defaults; a file that
/// exists but does not parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let explicit = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config_path = explicit.clone().unwrap_or_else(Config::default_path);

    let mut config = if config_path.exists() {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else if explicit.is_some() {
        anyhow::bail!("Configuration file {} not found", config_path.display());
    } else {
        Config::default()
    };
    config.apply_env();

    Ok((config, config_path))
}

/// The opened database and the adapters built directly on it
pub struct Stores {
    pool: DatabasePool,
    pub rows: Arc<SqliteRowStore>,
    pub state: Arc<SqliteStateStore>,
    pub clock: Arc<dyn Clock>,
}

impl Stores {
    /// Opens (and migrates) the database named in `config`
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        info!(path = %config.database.path.display(), "Database opened");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: DatabasePool) -> Self {
        Self {
            rows: Arc::new(SqliteRowStore::new(pool.pool().clone())),
            state: Arc::new(SqliteStateStore::new(pool.pool().clone())),
            clock: Arc::new(SystemClock),
            pool,
        }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn writer(&self, config: &Config) -> BatchedWriter {
        let store: Arc<dyn IRowStore> = self.rows.clone();
        BatchedWriter::new(store, WriterSettings::from_config(&config.writer))
    }

    pub fn processor(&self, config: &Config) -> WebhookProcessor {
        WebhookProcessor::new(self.writer(config), self.clock.clone())
    }

    /// Token manager persisting its token in the state store
    ///
    /// # Errors
    ///
    /// Fails when the client id or secret is not configured.
    pub fn tokens(&self, config: &Config, http: reqwest::Client) -> Result<TokenManager> {
        let settings = TokenSettings::from_config(config)?;
        let store: Arc<dyn IStateStore> = self.state.clone();
        Ok(TokenManager::new(http, settings, self.clock.clone(), Some(store)))
    }

    /// The sync engine over the upstream platform
    pub fn engine(&self, config: &Config) -> Result<SyncEngine> {
        let http = http_client()?;
        let tokens = self.tokens(config, http.clone())?;
        let api = Arc::new(PlatformApi::new(UpstreamClient::from_config(
            http, config, tokens,
        )));
        Ok(SyncEngine::new(
            api,
            self.state.clone(),
            self.writer(config),
            self.clock.clone(),
            SyncSettings::from_config(&config.sync),
        ))
    }
}

/// Shared HTTP client; per-call timeouts come from the retry policy
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("salesync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
