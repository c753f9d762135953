//! Status, validation and shutdown reports.

use std::collections::BTreeMap;
use std::fmt;

use hostbridge_config::ShutdownPolicy;
use hostbridge_core::{Category, TeardownFailure};
use hostbridge_tasks::QueueStats;
use serde::Serialize;

/// Where the coordinator is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Built, not yet initialized.
    Created,
    /// Serving.
    Running,
    /// Initialization failed; call `initialize` again after fixing the cause.
    Failed,
    /// Shut down. Terminal.
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        })
    }
}

/// Aggregate view of the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStatus {
    /// Lifecycle state.
    pub state: Lifecycle,
    /// Registered handlers per category.
    pub handlers: BTreeMap<Category, usize>,
    /// Installed routes.
    pub routes: usize,
    /// Queue statistics, once the queue exists.
    pub queue: Option<QueueStats>,
    /// Version of the active configuration snapshot.
    pub config_version: Option<u64>,
    /// Modules that failed to load at startup.
    pub discovery_failures: Vec<String>,
}

impl BridgeStatus {
    pub(crate) fn idle(state: Lifecycle) -> Self {
        Self {
            state,
            handlers: BTreeMap::new(),
            routes: 0,
            queue: None,
            config_version: None,
            discovery_failures: Vec::new(),
        }
    }

    /// Total registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().sum()
    }
}

/// Result of re-checking the running bridge against its configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Handlers checked.
    pub handlers_checked: usize,
    /// Routes checked.
    pub routes_checked: usize,
    /// One message per failed check. Empty means healthy.
    pub problems: Vec<String>,
}

impl ValidationReport {
    /// True when no check failed.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// What shutdown did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Policy applied to queued tasks.
    pub policy: ShutdownPolicy,
    /// Tasks run on the host during shutdown.
    pub drained: usize,
    /// Tasks dropped without running; their callers got a 503.
    pub discarded: usize,
    /// Handlers whose teardown failed.
    pub teardown_failures: Vec<TeardownFailure>,
}
