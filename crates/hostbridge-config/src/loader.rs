//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use crate::{BridgeConfig, Category, ConfigError, EndpointKey, LogFormat, ShutdownPolicy};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use hostbridge_config::ConfigLoader;
///
/// # fn main() -> Result<(), hostbridge_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("hostbridge.toml")?
///     .with_env_prefix("HOSTBRIDGE")
///     .load()?;
///
/// println!("listening on {}", config.server_config.addr());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: BridgeConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new loader starting from default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            env_prefix: None,
        }
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`. Sections the
    /// file omits keep their defaults; unknown fields are rejected.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        tracing::debug!(path = %path.display(), "configuration file loaded");
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Example
    ///
    /// ```
    /// use hostbridge_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server_config]
    ///     port = 3000
    ///
    ///     [endpoints.design.geometry]
    ///     box = "/Box"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server_config.port, 3000);
    /// assert_eq!(config.endpoints.len(), 1);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::invalid_value(
                    "format",
                    format!("unsupported configuration format: {format}"),
                ))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `HOSTBRIDGE__SERVER_CONFIG__PORT=9000`. Endpoint paths can be
    /// overridden with `HOSTBRIDGE__ENDPOINTS__DESIGN__GEOMETRY__BOX=/Box`
    /// (group and name are lowercased).
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), ".env loaded");
        }
        self
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment overrides (if a prefix was set) and validates the
    /// result, reporting every failed check.
    pub fn load(mut self) -> Result<BridgeConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            self.apply_env_overrides(&prefix, vars)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> BridgeConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<BridgeConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::invalid_value(
                "path",
                format!("unsupported configuration file format: {}", path.display()),
            )),
        }
    }

    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Shares the prefix but is not ours (e.g. HOSTBRIDGE_HOME)
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["SERVER_CONFIG", "HOST"] => {
                self.config.server_config.host = value.to_string();
            }
            ["SERVER_CONFIG", "PORT"] => {
                self.config.server_config.port = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected port number"))?;
            }
            ["SERVER_CONFIG", "TIMEOUT_MS"] => {
                self.config.server_config.timeout_ms = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            ["SERVER_CONFIG", "MAX_RETRIES"] => {
                self.config.server_config.max_retries = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }

            ["QUEUE", "CAPACITY"] => {
                self.config.queue.capacity = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            ["QUEUE", "DRAIN_BATCH"] => {
                self.config.queue.drain_batch = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            ["QUEUE", "SHUTDOWN_POLICY"] => {
                self.config.queue.shutdown_policy = match value.to_lowercase().as_str() {
                    "drain" => ShutdownPolicy::Drain,
                    "discard" => ShutdownPolicy::Discard,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'drain' or 'discard'",
                        ))
                    }
                };
            }

            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => {
                self.config.logging.ansi_enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }

            ["ENDPOINTS", category, group, name] => {
                let category: Category = category
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "unknown category"))?;
                self.config.endpoints.insert(
                    EndpointKey::new(category, group.to_lowercase(), name.to_lowercase()),
                    value,
                );
            }

            _ => {
                tracing::warn!(var = key, "ignoring unrecognised configuration override");
            }
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn overrides(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server_config.port, 8080);
        assert_eq!(config.queue.capacity, 1024);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server_config]
            port = 9100

            [endpoints.manufacture.cam]
            setups = "/cam/setups"
            setup = "/cam/setups/{{id}}"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.server_config.port, 9100);
        assert_eq!(config.endpoints.len(), 2);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"endpoints": {{"design": {{"geometry": {{"box": "/Box"}}}}}}, "module_config": {{"geometry": {{"units": "mm"}}}}}}"#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.module("geometry").unwrap()["units"], "mm");
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new().with_file("/nonexistent/hostbridge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_optional_missing_file() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/hostbridge.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ConfigLoader::new().with_string("[server_config]\nlisten = 1", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_overrides(
                "HOSTBRIDGE",
                overrides(&[
                    ("HOSTBRIDGE__SERVER_CONFIG__PORT", "9000"),
                    ("HOSTBRIDGE__QUEUE__SHUTDOWN_POLICY", "drain"),
                    ("HOSTBRIDGE__LOGGING__FORMAT", "pretty"),
                    ("HOSTBRIDGE__ENDPOINTS__DESIGN__GEOMETRY__BOX", "/Box"),
                    ("HOSTBRIDGE_HOME", "/opt/hostbridge"),
                ]),
            )
            .unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.server_config.port, 9000);
        assert_eq!(config.queue.shutdown_policy, ShutdownPolicy::Drain);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(
            config
                .endpoints
                .path(&EndpointKey::new(Category::Design, "geometry", "box")),
            Some("/Box")
        );
    }

    #[test]
    fn test_env_parse_failure() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_overrides(
            "HOSTBRIDGE",
            overrides(&[("HOSTBRIDGE__SERVER_CONFIG__PORT", "eighty")]),
        );
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[queue]\ncapacity = 0", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
