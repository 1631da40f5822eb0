//! Salesync CLI - Command-line interface for Salesync
//!
//! Provides commands for:
//! - Running a sync invocation by hand
//! - Inspecting the persisted cursor, resource support and row counts
//! - Replaying a webhook payload from a file
//! - Checking the upstream token
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use salesync_core::config::LoggingConfig;
use salesync_daemon::{load_config, logging};

mod commands;
mod output;

use commands::{
    config::ConfigCommand, status::StatusCommand, sync::SyncCommand, token::TokenCommand,
    webhook::WebhookCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "salesync",
    version,
    about = "Mirror a sales platform into a local database"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one sync invocation
    Sync(SyncCommand),
    /// Show the sync cursor, resource support and row counts
    Status(StatusCommand),
    /// Apply a webhook payload read from a file
    Webhook(WebhookCommand),
    /// Obtain (or refresh) the upstream access token
    Token(TokenCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Log level for a `-v` count
///
/// Logs share stdout with command output, so the CLI stays at `warn`
/// unless asked for more. `RUST_LOG` still overrides.
fn verbosity_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    // `config` subcommands report load failures themselves
    if let Commands::Config(cmd) = &cli.command {
        logging::init(&LoggingConfig::default(), Some(verbosity_level(cli.verbose)), false);
        return cmd.execute(cli.config.as_deref(), format).await;
    }

    let (config, _) = load_config(cli.config.as_deref())?;
    logging::init(&config.logging, Some(verbosity_level(cli.verbose)), false);

    match &cli.command {
        Commands::Sync(cmd) => cmd.execute(&config, format).await,
        Commands::Status(cmd) => cmd.execute(&config, format).await,
        Commands::Webhook(cmd) => cmd.execute(&config, format).await,
        Commands::Token(cmd) => cmd.execute(&config, format).await,
        Commands::Config(_) => Ok(()),
    }
}
