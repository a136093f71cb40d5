//! ## availsim-telemetry::logging
//! **Process-wide tracing subscriber**
//!
//! `RUST_LOG` takes precedence over the configured level, so a single run
//! can be made verbose without touching configuration files.

use availsim_config::TelemetryConfig;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Filter from `RUST_LOG` if set, otherwise from `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        directive: level.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the fmt subscriber with thread names, so worker activity can be
/// told apart in the output.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    fmt()
        .with_env_filter(build_filter(level)?)
        .with_thread_names(true)
        .with_target(false)
        .try_init()
        .map_err(|e| {
            warn!(level, "global subscriber already installed, keeping it");
            LoggingError::AlreadyInitialized(e.to_string())
        })
}

/// [`init_logging`] at the level named by the telemetry section.
pub fn init_logging_from(config: &TelemetryConfig) -> Result<(), LoggingError> {
    init_logging(&config.log_level)
}
