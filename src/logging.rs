use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::env;
use crate::error::{Result, SinkError};

/// Logger settings.
///
/// **Fields**
/// - `level`: default filter directive (`info`, `debug`, `pgsink=trace`, ...).
///   `RUST_LOG` takes precedence when set.
/// - `log_file`: append to this file instead of stderr.
/// - `ansi`: colourize stderr output. Never applied to files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub log_file: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Read `PG_SINK_LOG_LEVEL` / `PG_SINK_LOG_FILE`, keeping defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env::env_or(env::PG_SINK_LOG_LEVEL_ENV, &defaults.level),
            log_file: env::env_opt(env::PG_SINK_LOG_FILE_ENV).map(PathBuf::from),
            ..defaults
        }
    }
}

/// Install the global `tracing` subscriber described by `config`.
///
/// Fails with [`SinkError::Logging`] if the filter is invalid, the log file
/// cannot be opened, or another global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| SinkError::Logging(format!("invalid level {:?}: {}", config.level, e)))?;

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| SinkError::Logging(format!("cannot open {}: {}", path.display(), e)))?;
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false);
            Registry::default()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| SinkError::Logging(e.to_string()))
        }
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi);
            Registry::default()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| SinkError::Logging(e.to_string()))
        }
    }
}
