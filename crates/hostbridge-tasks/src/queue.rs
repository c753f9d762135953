//! The priority task queue.
//!
//! Producers on any thread call [`TaskQueue::enqueue`]; the host thread calls
//! [`TaskQueue::drain`] from its own loop. The heap lock is held only to push
//! or pop, never while a handler runs, so producers are not blocked by host
//! work and a handler may itself enqueue.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::thread::ThreadId;
use std::time::Instant;

use hostbridge_config::QueueConfig;
use hostbridge_core::{panic_message, Priority};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::context::HostContext;
use crate::error::{QueueError, TaskError, TaskResult};
use crate::stats::{QueueCounters, QueueStats};
use crate::task::{Task, TaskHandle};

/// What one [`TaskQueue::drain`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Tasks popped and run.
    pub executed: usize,
    /// Tasks whose handler returned a value.
    pub succeeded: usize,
    /// Tasks whose handler returned an error or panicked.
    pub failed: usize,
    /// Tasks whose caller had stopped waiting; their result was dropped.
    pub abandoned: usize,
}

struct QueuedTask {
    sequence: u64,
    enqueued_at: Instant,
    task: Task,
    reply: oneshot::Sender<TaskResult<Value>>,
}

impl QueuedTask {
    fn key(&self) -> (Priority, std::cmp::Reverse<u64>) {
        (self.task.priority, std::cmp::Reverse(self.sequence))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Max-heap: higher priority first, then lower sequence first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key().cmp(&other.key())
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<QueuedTask>,
    next_sequence: u64,
}

/// Bounded, priority-ordered queue of host-thread work.
///
/// Higher [`Priority`] runs first; equal priorities run in enqueue order.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use hostbridge_core::{FnHandler, HandlerRequest};
/// use hostbridge_tasks::{HostContext, Task, TaskQueue};
/// use serde_json::json;
///
/// let queue = TaskQueue::new(16);
/// let handler = Arc::new(FnHandler::new(|_req| Ok(json!({"created": true}))));
/// let handle = queue
///     .enqueue(Task::new("POST /Box", handler, HandlerRequest::default()))
///     .unwrap();
///
/// // On the host thread
/// let ctx = HostContext::current();
/// let report = queue.drain(&ctx, 8).unwrap();
/// assert_eq!(report.succeeded, 1);
///
/// let value = handle.wait_blocking(Duration::from_secs(1)).unwrap();
/// assert_eq!(value["created"], true);
/// ```
pub struct TaskQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    closed: AtomicBool,
    host: OnceLock<ThreadId>,
    counters: QueueCounters,
}

impl TaskQueue {
    /// Creates an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
            closed: AtomicBool::new(false),
            host: OnceLock::new(),
            counters: QueueCounters::default(),
        }
    }

    /// Creates a queue sized from configuration.
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Submits a task. Safe to call from any thread.
    ///
    /// When the queue is full or closed the task is dropped and the queue
    /// is left unchanged.
    pub fn enqueue(&self, task: Task) -> Result<TaskHandle, QueueError> {
        let (reply, rx) = oneshot::channel();
        let id = task.id;

        {
            let mut inner = self.inner.lock();
            if self.closed.load(Ordering::Acquire) {
                drop(inner);
                self.counters.record_rejected();
                debug!(task_id = %id, label = %task.label, "enqueue refused, queue closed");
                return Err(QueueError::Closed);
            }
            if inner.heap.len() >= self.capacity {
                let depth = inner.heap.len();
                drop(inner);
                self.counters.record_rejected();
                warn!(
                    task_id = %id,
                    label = %task.label,
                    depth,
                    capacity = self.capacity,
                    "task queue full"
                );
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }

            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            debug!(
                task_id = %id,
                label = %task.label,
                priority = %task.priority,
                sequence,
                "task enqueued"
            );
            inner.heap.push(QueuedTask {
                sequence,
                enqueued_at: Instant::now(),
                task,
                reply,
            });
        }

        self.counters.record_enqueued();
        Ok(TaskHandle::new(id, rx))
    }

    /// Runs up to `max_items` tasks on the host thread.
    ///
    /// The queue binds to the thread of the first context that drains it.
    /// Draining from any other thread returns [`QueueError::WrongContext`]
    /// and runs nothing. Handler errors and panics are captured per task and
    /// never stop the drain.
    pub fn drain(&self, ctx: &HostContext, max_items: usize) -> Result<DrainReport, QueueError> {
        let bound = *self.host.get_or_init(|| {
            info!(thread = ?ctx.thread_id(), name = ?ctx.thread_name(), "task queue bound to host thread");
            ctx.thread_id()
        });
        if bound != ctx.thread_id() {
            warn!(thread = ?ctx.thread_id(), "drain rejected outside the host thread");
            return Err(QueueError::WrongContext);
        }

        let mut report = DrainReport::default();
        while report.executed < max_items {
            // Lock released before the handler runs
            let Some(queued) = self.inner.lock().heap.pop() else {
                break;
            };
            self.execute(queued, &mut report);
        }

        if report.executed > 0 {
            debug!(
                executed = report.executed,
                failed = report.failed,
                abandoned = report.abandoned,
                "drain finished"
            );
        }
        Ok(report)
    }

    fn execute(&self, queued: QueuedTask, report: &mut DrainReport) {
        let QueuedTask {
            enqueued_at,
            task,
            reply,
            ..
        } = queued;

        self.counters.record_started(enqueued_at.elapsed());
        report.executed += 1;

        let started = Instant::now();
        let handler = task.handler;
        let request = task.request;
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.call(request)));

        let result = match outcome {
            Ok(Ok(value)) => {
                report.succeeded += 1;
                self.counters.record_completed();
                debug!(
                    task_id = %task.id,
                    label = %task.label,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task completed"
                );
                Ok(value)
            }
            Ok(Err(error)) => {
                report.failed += 1;
                self.counters.record_failed();
                warn!(task_id = %task.id, label = %task.label, %error, "task failed");
                Err(TaskError::Failed(error))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                report.failed += 1;
                self.counters.record_failed();
                warn!(task_id = %task.id, label = %task.label, panic = %message, "task panicked");
                Err(TaskError::Panicked(message))
            }
        };

        if reply.send(result).is_err() {
            report.abandoned += 1;
            self.counters.record_abandoned();
            debug!(task_id = %task.id, label = %task.label, "result discarded, caller gone");
        }
    }

    /// Stops accepting new tasks. Queued tasks stay queued.
    pub fn close(&self) {
        // Taken under the lock so no enqueue lands after a following discard
        let _inner = self.inner.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("task queue closed");
        }
    }

    /// Removes every queued task, answering each caller with
    /// [`TaskError::Discarded`]. Returns how many were removed.
    pub fn discard_pending(&self) -> usize {
        let pending: Vec<QueuedTask> = {
            let mut inner = self.inner.lock();
            inner.heap.drain().collect()
        };

        let count = pending.len();
        for queued in pending {
            let _ = queued.reply.send(Err(TaskError::Discarded));
        }
        if count > 0 {
            self.counters.record_discarded(count as u64);
            warn!(count, "queued tasks discarded");
        }
        count
    }

    /// Returns true once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current statistics.
    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot(self.len(), self.capacity)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("queued", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
