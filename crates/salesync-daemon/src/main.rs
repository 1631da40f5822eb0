//! Salesync Daemon - background ingestion service
//!
//! This binary handles:
//! - Scheduled sync invocations, one every `sync.tick_interval_secs`
//! - The inbound webhook endpoint
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The webhook server runs as its own task. The main task runs the sync
//! loop; ticks are strictly sequential, so two invocations never overlap.
//! Both stop when the shared `CancellationToken` is triggered.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use salesync_core::config::Config;
use salesync_core::domain::SyncRequest;
use salesync_daemon::{load_config, logging, Stores, WebhookServer};
use salesync_sync::SyncEngine;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the opened stores and the shutdown token
struct DaemonService {
    config: Config,
    stores: Stores,
    shutdown: CancellationToken,
}

impl DaemonService {
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            let listed: Vec<String> = problems.iter().map(ToString::to_string).collect();
            anyhow::bail!("Invalid configuration: {}", listed.join("; "));
        }

        let stores = Stores::open(&config).await?;

        Ok(Self {
            config,
            stores,
            shutdown,
        })
    }

    /// Starts the webhook server, then runs the sync loop until shutdown
    async fn run(&self) -> Result<()> {
        let engine = self
            .stores
            .engine(&self.config)
            .context("Failed to set up the sync engine")?;

        let processor = Arc::new(self.stores.processor(&self.config));
        let server = WebhookServer::new(processor, &self.config.webhook)?;
        let server_shutdown = self.shutdown.clone();
        let server_task = tokio::spawn(async move { server.run(server_shutdown).await });

        let result = self.sync_loop(&engine).await;

        // The server stops on the same token; make sure it does if the loop failed
        self.shutdown.cancel();
        match server_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %format!("{e:#}"), "Webhook server failed"),
            Err(e) => error!(error = %e, "Webhook server task panicked"),
        }

        result
    }

    // ========================================================================
    // Scheduled sync
    // ========================================================================

    /// Runs one default sync invocation per tick
    ///
    /// The first tick fires immediately. A tick that comes due while an
    /// invocation is still running is delayed, not queued.
    async fn sync_loop(&self, engine: &SyncEngine) -> Result<()> {
        let tick_secs = self.config.sync.tick_interval_secs.max(1);
        info!(
            tick_interval_secs = tick_secs,
            budget_ms = self.config.sync.budget_ms,
            "Starting sync loop"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }

            let report = tokio::select! {
                report = engine.run_default(&SyncRequest::Default) => report,
                _ = self.shutdown.cancelled() => {
                    // The cursor only moves after a committed page, so
                    // abandoning a run mid-page loses nothing.
                    info!("Shutdown signal received during sync run");
                    break;
                }
            };

            if report.ok {
                info!(
                    done = report.done,
                    pages = report.pages_fetched,
                    rows_fetched = report.rows_fetched,
                    resource = %report.cursor.resource,
                    page = report.cursor.page,
                    "Sync tick completed"
                );
            } else {
                warn!(
                    error = report.error.as_deref().unwrap_or("unknown"),
                    resource = %report.cursor.resource,
                    page = report.cursor.page,
                    "Sync tick stopped early"
                );
            }
        }

        info!("Sync loop terminated");
        Ok(())
    }
}

// ============================================================================
// Graceful shutdown
// ============================================================================

/// Waits for SIGTERM or SIGINT and cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = load_config(None)?;
    logging::init(&config.logging, None, true);

    info!(config_path = %config_path.display(), "Salesync daemon starting (salesyncd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("Salesync daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "Salesync daemon exiting with error"),
    }

    result
}
