//! Config command - View and validate configuration
//!
//! Provides:
//! - `salesync config show` - print the effective configuration as YAML
//! - `salesync config validate` - check the configuration file for errors
//! - `salesync config path` - print which file would be loaded

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;
use salesync_core::config::Config;
use salesync_daemon::bootstrap::CONFIG_ENV;
use salesync_daemon::load_config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

const REDACTED: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (file plus environment overrides)
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, path: Option<&Path>, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(path, format),
            ConfigCommand::Validate => execute_validate(path, format),
            ConfigCommand::Path => execute_path(path, format),
        }
    }
}

fn execute_show(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let (config, config_path) = load_config(path)?;
    let config = redacted(config);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        formatter.print_json(&serde_json::to_value(&config)?);
    } else {
        println!("# {}", config_path.display());
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}

fn execute_validate(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config_path = resolve_path(path);

    // Load the file itself; a missing or broken file is a finding here
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            let message = if config_path.exists() {
                format!("Failed to parse configuration: {e}")
            } else {
                "Configuration file not found; defaults apply".to_string()
            };
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", config_path.display()));
            }
            anyhow::bail!("Configuration is not valid");
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors = config.validate();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Configuration is not valid")
    }
}

fn execute_path(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config_path = resolve_path(path);

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "config_path": config_path.display().to_string(),
            "exists": config_path.exists(),
        }));
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}

/// Same precedence as [`load_config`]: flag, then environment, then default
fn resolve_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(Config::default_path)
}

/// Masks credentials before printing
fn redacted(mut config: Config) -> Config {
    if config.upstream.client_secret.is_some() {
        config.upstream.client_secret = Some(REDACTED.to_string());
    }
    config
}
