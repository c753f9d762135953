//! Task identity, the task itself and its result handle.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hostbridge_core::{Handler, HandlerRequest, Priority};
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pending handler invocation.
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) label: String,
    pub(crate) priority: Priority,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) request: HandlerRequest,
    pub(crate) created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task at [`Priority::NORMAL`].
    ///
    /// `label` names the task in logs, usually the route id.
    pub fn new(label: impl Into<String>, handler: Arc<dyn Handler>, request: HandlerRequest) -> Self {
        Self {
            id: TaskId::new(),
            label: label.into(),
            priority: Priority::NORMAL,
            handler,
            request,
            created_at: Utc::now(),
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Task id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// When the task was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Result slot of an enqueued task.
///
/// The slot is written once by the host thread. Dropping the handle (for
/// example after a timeout) leaves the task queued; its result is then
/// discarded when it completes.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<TaskResult<Value>>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<TaskResult<Value>>) -> Self {
        Self { id, rx }
    }

    /// Get the task ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Waits for the result, giving up after `timeout`.
    ///
    /// Only the calling task is suspended; other producers are unaffected.
    pub async fn wait(self, timeout: Duration) -> TaskResult<Value> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a value: the queue itself went away
            Ok(Err(_)) => Err(TaskError::Discarded),
            Err(_) => Err(TaskError::timeout(timeout)),
        }
    }

    /// Blocking variant of [`wait`](Self::wait) for threads outside a runtime.
    ///
    /// Must not be called from the host thread for a host-thread task: the
    /// task can only complete when that thread drains.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn wait_blocking(mut self, timeout: Duration) -> TaskResult<Value> {
        let deadline = Instant::now().checked_add(timeout);
        let mut pause = Duration::from_micros(50);
        loop {
            match self.rx.try_recv() {
                Ok(result) => return result,
                Err(oneshot::error::TryRecvError::Closed) => return Err(TaskError::Discarded),
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
            let sleep = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TaskError::timeout(timeout));
                    }
                    pause.min(deadline - now)
                }
                None => pause,
            };
            std::thread::sleep(sleep);
            pause = (pause * 2).min(Duration::from_millis(5));
        }
    }
}
