//! Configuration schema types.
//!
//! This module defines the fixed-shape sections of the configuration file.
//! The endpoint map lives in [`crate::endpoints`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `server_config` section.
///
/// # Example
///
/// ```
/// use hostbridge_config::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.addr(), "127.0.0.1:8080");
/// assert_eq!(config.timeout().as_secs(), 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host name or address the HTTP listener binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port the HTTP listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a request waits for a host-thread task, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How many times a rejected enqueue is retried before answering 503.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the default task wait bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

/// What happens to queued tasks at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Fail every queued task with a discarded error.
    #[default]
    Discard,
    /// Execute every queued task on the host thread before stopping.
    Drain,
}

/// `queue` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum number of pending tasks; enqueues beyond this are rejected.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Maximum number of tasks executed per host pump.
    #[serde(default = "default_drain_batch")]
    pub drain_batch: usize,

    /// What to do with pending tasks at shutdown.
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            drain_batch: default_drain_batch(),
            shutdown_policy: ShutdownPolicy::default(),
        }
    }
}

fn default_capacity() -> usize {
    1024
}

fn default_drain_batch() -> usize {
    16
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs.
    #[default]
    Json,
    /// Human-readable format for development.
    Pretty,
}

/// `logging` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `hostbridge=debug,warn`, ...).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in pretty output.
    #[serde(default)]
    pub ansi_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
