//! # Hostbridge Tasks
//!
//! The queue that carries requests from server tasks onto the host thread.
//!
//! Producers on any thread [`enqueue`](TaskQueue::enqueue) a [`Task`] and get
//! a [`TaskHandle`] back. The host application calls
//! [`drain`](TaskQueue::drain) from its own loop with a [`HostContext`]
//! captured on that thread; each drained task runs synchronously there and
//! its outcome is delivered to the handle.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hostbridge_core::{FnHandler, HandlerRequest, Priority};
//! use hostbridge_tasks::{HostContext, Task, TaskQueue};
//! use serde_json::json;
//!
//! # async fn example() {
//! let queue = Arc::new(TaskQueue::new(1024));
//!
//! // Host side: pump the queue from the host's idle callback
//! let host_queue = Arc::clone(&queue);
//! std::thread::spawn(move || {
//!     let ctx = HostContext::current();
//!     loop {
//!         let _ = host_queue.drain(&ctx, 16);
//!         std::thread::sleep(Duration::from_millis(10));
//!     }
//! });
//!
//! // Server side
//! let handler = Arc::new(FnHandler::new(|_req| Ok(json!({"volume": 6.0}))));
//! let task = Task::new("POST /Box", handler, HandlerRequest::default())
//!     .with_priority(Priority::HIGH);
//! let result = queue.enqueue(task).unwrap().wait(Duration::from_secs(30)).await;
//! # }
//! ```
//!
//! ## Ordering
//!
//! Higher [`Priority`](hostbridge_core::Priority) runs first. Within one
//! priority, tasks run in the order they were enqueued.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod context;
mod error;
mod queue;
mod stats;
mod task;

pub use context::HostContext;
pub use error::{QueueError, TaskError, TaskResult};
pub use hostbridge_config::ShutdownPolicy;
pub use hostbridge_core::Priority;
pub use queue::{DrainReport, TaskQueue};
pub use stats::QueueStats;
pub use task::{Task, TaskHandle, TaskId};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::HostContext;
    pub use crate::error::{QueueError, TaskError, TaskResult};
    pub use crate::queue::{DrainReport, TaskQueue};
    pub use crate::task::{Task, TaskHandle, TaskId};
}
