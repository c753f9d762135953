//! Coordinator error types.

use std::fmt;

use hostbridge_config::ConfigError;
use hostbridge_router::RouteError;
use serde::Serialize;
use thiserror::Error;

/// A step of [`Coordinator::initialize`](crate::Coordinator::initialize).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// The coordinator was not in a state that allows the call.
    Lifecycle,
    /// Configuration validation.
    Config,
    /// Handler module discovery.
    Discovery,
    /// Descriptor validation and registration.
    Validation,
    /// Route table construction.
    Routes,
    /// Task queue and dispatcher start.
    Queue,
    /// Aggregate status report.
    Status,
}

impl Stage {
    /// Lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::Config => "config",
            Self::Discovery => "discovery",
            Self::Validation => "validation",
            Self::Routes => "routes",
            Self::Queue => "queue",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    /// Stage that ran the check.
    pub stage: Stage,
    /// What failed.
    pub message: String,
}

impl StageFailure {
    pub(crate) fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

/// Startup failed. Lists every failed check, not only the first.
#[derive(Debug, Clone, Error)]
#[error("initialization failed with {} problem(s): {}", .failures.len(), join(.failures))]
pub struct InitError {
    /// Every failed check, in stage order.
    pub failures: Vec<StageFailure>,
}

impl InitError {
    /// Failures from one stage.
    pub fn in_stage(&self, stage: Stage) -> impl Iterator<Item = &StageFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    /// Stages that reported at least one failure, in order.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self.failures.iter().map(|f| f.stage).collect();
        stages.dedup();
        stages
    }
}

fn join(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A configuration update was refused. Nothing was changed.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The coordinator is not running.
    #[error("bridge is not running")]
    NotRunning,

    /// The new configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The new paths would produce a conflicting route table.
    #[error("route table rejected: {0}")]
    Routes(#[from] RouteError),

    /// Registered handlers would lose their endpoints.
    #[error("handlers would become unroutable: {}", .problems.join("; "))]
    Orphaned {
        /// One message per affected handler.
        problems: Vec<String>,
    },
}
