//! Main configuration types.
//!
//! This module provides the top-level [`BridgeConfig`] struct and its builder.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ConfigError, EndpointKey, EndpointMap, LoggingConfig, QueueConfig, ServerConfig};

/// Per-module settings blobs, keyed by module name.
pub type ModuleConfigMap = IndexMap<String, Value>;

/// Complete bridge configuration.
///
/// This is the root configuration type. Use
/// [`ConfigLoader`](crate::ConfigLoader) to load it from files and environment
/// variables.
///
/// # Example
///
/// ```
/// use hostbridge_config::BridgeConfig;
///
/// let config = BridgeConfig::default();
/// assert_eq!(config.server_config.port, 8080);
/// assert!(config.endpoints.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Listener and request settings.
    #[serde(default)]
    pub server_config: ServerConfig,

    /// Task queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Endpoint paths.
    #[serde(default)]
    pub endpoints: EndpointMap,

    /// Opaque settings handed to handler modules.
    #[serde(default)]
    pub module_config: ModuleConfigMap,
}

impl BridgeConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    /// Runs every check and returns one message per failure.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server_config.host.trim().is_empty() {
            problems.push("server_config.host: must not be empty".to_string());
        }
        if self.server_config.timeout_ms == 0 {
            problems.push("server_config.timeout_ms: must be greater than zero".to_string());
        }
        if self.queue.capacity == 0 {
            problems.push("queue.capacity: must be greater than zero".to_string());
        }
        if self.queue.drain_batch == 0 {
            problems.push("queue.drain_batch: must be greater than zero".to_string());
        }
        if self.logging.level.trim().is_empty() {
            problems.push("logging.level: must not be empty".to_string());
        }

        problems.extend(self.endpoints.problems());
        problems
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every failed check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::invalid(problems))
        }
    }

    /// Returns the settings blob for a module, if any.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Value> {
        self.module_config.get(name)
    }

    /// Returns a copy with one endpoint moved to `new_path`.
    ///
    /// The copy is validated as a whole, so a path that collides with another
    /// endpoint or does not compile is rejected.
    pub fn with_endpoint_path(&self, key: &EndpointKey, new_path: &str) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        next.endpoints.set_path(key, new_path)?;
        next.validate()?;
        Ok(next)
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server_config = server;
        self
    }

    /// Set the queue section.
    #[must_use]
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Add an endpoint.
    #[must_use]
    pub fn endpoint(mut self, key: EndpointKey, path: impl Into<String>) -> Self {
        self.config.endpoints.insert(key, path);
        self
    }

    /// Set the settings blob for a module.
    #[must_use]
    pub fn module_config(mut self, module: impl Into<String>, value: Value) -> Self {
        self.config.module_config.insert(module.into(), value);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}
