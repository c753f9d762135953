//! Error types for queue operations and task outcomes.

use std::time::Duration;

use hostbridge_core::HandlerError;
use thiserror::Error;

/// Result type for a task's outcome.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors returned when submitting to or draining the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("task queue full, capacity {capacity}")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },

    /// The queue no longer accepts tasks.
    #[error("task queue closed")]
    Closed,

    /// `drain` was called from a thread other than the bound host thread.
    #[error("drain called outside the host context")]
    WrongContext,
}

impl QueueError {
    /// Check if the caller may retry the enqueue.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Full { .. })
    }
}

/// Why a task produced no value.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The caller stopped waiting. The task may still run later.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The handler returned an error.
    #[error("task failed: {0}")]
    Failed(#[source] HandlerError),

    /// The handler panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was dropped without running (queue shut down).
    #[error("task discarded before execution")]
    Discarded,
}

impl TaskError {
    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Create a panicked error.
    pub fn panicked(reason: impl Into<String>) -> Self {
        Self::Panicked(reason.into())
    }

    /// Check if the task ran and failed, as opposed to never reporting.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }
}

impl From<HandlerError> for TaskError {
    fn from(e: HandlerError) -> Self {
        Self::Failed(e)
    }
}
