//! Immutable configuration snapshots and the diff between two of them.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{BridgeConfig, EndpointKey};

/// A validated, immutable configuration.
///
/// Snapshots are never edited. An update produces a new snapshot with a
/// higher version that replaces the old one as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    version: u64,
    loaded_at: DateTime<Utc>,
    config: BridgeConfig,
}

impl ConfigSnapshot {
    pub(crate) fn new(version: u64, config: BridgeConfig) -> Self {
        Self {
            version,
            loaded_at: Utc::now(),
            config,
        }
    }

    /// Monotonic version, starting at 1 for the initial configuration.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When this snapshot was installed.
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// The configuration values.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Deref for ConfigSnapshot {
    type Target = BridgeConfig;

    fn deref(&self) -> &Self::Target {
        &self.config
    }
}

/// One endpoint whose path was added, removed or moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointChange {
    /// The endpoint.
    pub key: EndpointKey,
    /// Path before the change, `None` if the endpoint is new.
    pub old_path: Option<String>,
    /// Path after the change, `None` if the endpoint was removed.
    pub new_path: Option<String>,
}

/// The difference between two consecutive snapshots.
///
/// Listeners receive this after the new snapshot is installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigChange {
    /// Version that was replaced.
    pub from_version: u64,
    /// Version now installed.
    pub to_version: u64,
    /// Endpoint paths that differ.
    pub endpoints: Vec<EndpointChange>,
    /// Modules whose settings blob was added, removed or changed.
    pub modules: Vec<String>,
    /// `server_config` differs.
    pub server_changed: bool,
    /// `queue` differs.
    pub queue_changed: bool,
    /// `logging` differs.
    pub logging_changed: bool,
    /// Changed settings that a running bridge cannot apply. They are stored
    /// in the snapshot but only take effect after a restart.
    pub restart_required: Vec<&'static str>,
}

impl ConfigChange {
    /// Computes the diff from `old` to `new`.
    #[must_use]
    pub fn between(old: &ConfigSnapshot, new: &ConfigSnapshot) -> Self {
        let mut endpoints: Vec<EndpointChange> = new
            .endpoints
            .iter()
            .filter_map(|(key, path)| {
                let old_path = old.endpoints.path(&key);
                (old_path != Some(path)).then(|| EndpointChange {
                    old_path: old_path.map(str::to_string),
                    new_path: Some(path.to_string()),
                    key,
                })
            })
            .collect();
        endpoints.extend(
            old.endpoints
                .iter()
                .filter(|(key, _)| !new.endpoints.contains(key))
                .map(|(key, path)| EndpointChange {
                    key,
                    old_path: Some(path.to_string()),
                    new_path: None,
                }),
        );

        let mut modules: Vec<String> = new
            .module_config
            .iter()
            .filter(|(name, value)| old.module_config.get(*name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        modules.extend(
            old.module_config
                .keys()
                .filter(|name| !new.module_config.contains_key(*name))
                .cloned(),
        );

        let mut restart_required = Vec::new();
        if old.server_config.host != new.server_config.host {
            restart_required.push("server_config.host");
        }
        if old.server_config.port != new.server_config.port {
            restart_required.push("server_config.port");
        }
        if old.queue.capacity != new.queue.capacity {
            restart_required.push("queue.capacity");
        }
        if old.logging != new.logging {
            restart_required.push("logging");
        }

        Self {
            from_version: old.version,
            to_version: new.version,
            endpoints,
            modules,
            server_changed: old.server_config != new.server_config,
            queue_changed: old.queue != new.queue,
            logging_changed: old.logging != new.logging,
            restart_required,
        }
    }

    /// Returns true if nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
            && self.modules.is_empty()
            && !self.server_changed
            && !self.queue_changed
            && !self.logging_changed
    }
}
