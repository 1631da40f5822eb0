//! Token command - Obtain the upstream access token
//!
//! Useful to check credentials before the first sync. Only the token type
//! and expiry are printed.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use salesync_core::config::Config;
use salesync_daemon::bootstrap::http_client;
use salesync_daemon::Stores;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct TokenCommand {
    /// Request a new token even if the cached one is still valid
    #[arg(long)]
    pub force: bool,
}

impl TokenCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let stores = Stores::open(config).await?;
        let tokens = stores.tokens(config, http_client()?)?;
        let token = tokens.token(self.force).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "token_type": token.token_type,
                "expires_at": token.expires_at,
            }));
        } else {
            let minutes = (token.expires_at - Utc::now()).num_minutes().max(0);
            formatter.success(if self.force {
                "Token refreshed"
            } else {
                "Token available"
            });
            formatter.info(&format!("Type: {}", token.token_type));
            formatter.info(&format!(
                "Expires: {} (in {minutes} min)",
                token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }

        Ok(())
    }
}
