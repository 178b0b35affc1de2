//! Structured logging bootstrap

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracksink_core::{TrackSinkError, TrackSinkResult};

/// Default log file name
pub const DEFAULT_LOG_FILE: &str = "tracksink.log";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`)
    pub level: String,
    /// Write to stderr
    pub console: bool,
    /// Append to this file as well
    pub file: Option<PathBuf>,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Console output only
    pub fn console_only() -> Self {
        Self {
            file: None,
            ..Default::default()
        }
    }
}

/// Debug logger for structured logging
#[derive(Debug, Clone, Default)]
pub struct DebugLogger {
    config: LoggingConfig,
}

impl DebugLogger {
    /// Create a logger for `config`
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Install this logger as the global subscriber
    pub fn init(&self) -> TrackSinkResult<()> {
        Self::init_logging(&self.config)
    }

    /// Initialize logging system
    ///
    /// `RUST_LOG` takes precedence over the configured level. Fails if a
    /// global subscriber is already installed.
    pub fn init_logging(config: &LoggingConfig) -> TrackSinkResult<()> {
        let level = parse_log_level(&config.level)?;

        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

        let console_layer = config
            .console
            .then(|| fmt::layer().with_target(true).with_ansi(config.ansi));

        let file_layer = match &config.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| TrackSinkError::Initialization {
                        reason: format!("Failed to open log file {}: {}", path.display(), e),
                    })?;
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_names(true)
                        .with_writer(Arc::new(file)),
                )
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| TrackSinkError::Initialization {
                reason: format!("Logging already initialized: {}", e),
            })?;

        tracing::debug!(level = %config.level, file = ?config.file, "📝 Logging initialized");
        Ok(())
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> TrackSinkResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(TrackSinkError::InvalidConfiguration {
            reason: format!("Invalid log level: {}", level),
        }),
    }
}
