//! Tracing initialisation
//!
//! `RUST_LOG` wins over the configured level. JSON lines are emitted when
//! `logging.json` is set, human-readable output otherwise.

use salesync_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber
///
/// `level` overrides `config.level` (the CLI passes its `-v` count here).
pub fn init(config: &LoggingConfig, level: Option<&str>, with_target: bool) {
    let level = level.unwrap_or(&config.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(with_target)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(with_target)
            .init();
    }
}
