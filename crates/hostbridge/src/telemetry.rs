//! Logging setup.
//!
//! Installs a global `tracing` subscriber from the `[logging]` section:
//! JSON lines for production, the pretty formatter for development.
//!
//! ```rust,ignore
//! use hostbridge::telemetry::init_logging;
//! use hostbridge_config::LoggingConfig;
//!
//! init_logging(&LoggingConfig::default())?;
//! tracing::info!(route = "POST /Box", status = 200, "request");
//! ```

use hostbridge_config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging could not be installed.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The level string is not a valid filter directive.
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter {
        /// The rejected directive.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Builds the filter for `config.level`.
///
/// Accepts anything `EnvFilter` does: `info`, `hostbridge_server=debug,warn`, ...
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::InvalidFilter {
        filter: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber. Call once, early in `main`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(config.ansi_enabled)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))
}

/// Field names shared by log lines across the workspace.
pub mod fields {
    /// Route id, `METHOD /pattern`.
    pub const ROUTE: &str = "route";
    /// Handler id, `category/name`.
    pub const HANDLER: &str = "handler";
    /// Task id.
    pub const TASK_ID: &str = "task_id";
    /// Request latency in milliseconds.
    pub const LATENCY_MS: &str = "latency_ms";
    /// Coarse request outcome.
    pub const OUTCOME: &str = "outcome";
}
