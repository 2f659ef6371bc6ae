//! Logging & tracing setup
//!
//! Configures `tracing-subscriber` for the sync engine with pretty, compact,
//! or JSON output and `RUST_LOG`-style filtering.

use crate::{Result, SyncError};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output for development
    Pretty,
    /// Single-line output
    #[default]
    Compact,
    /// Structured JSON for log pipelines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive, overridden by `RUST_LOG` when set
    pub default_directive: String,
    /// Include span close timings
    pub with_timings: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            default_directive: "info,sqlx=warn".to_string(),
            with_timings: false,
        }
    }
}

impl LoggingConfig {
    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the default filter directive
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }
}

/// Initialize global logging for the process.
///
/// Honors `RUST_LOG` when present, falling back to the configured default
/// directive.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global
/// subscriber is already installed
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_directive))
        .map_err(|e| SyncError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty())
            .try_init()
            .map_err(|e| SyncError::Logging(e.to_string())),
        LogFormat::Compact => registry
            .with(fmt::layer().compact())
            .try_init()
            .map_err(|e| SyncError::Logging(e.to_string())),
        LogFormat::Json => registry
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| SyncError::Logging(e.to_string())),
    }
}
