//! The host execution context handle.

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

/// Proof that the caller is on the host thread.
///
/// Created on the host thread with [`HostContext::current`] and passed to
/// [`TaskQueue::drain`](crate::TaskQueue::drain). It is neither `Send` nor
/// `Sync`, so it cannot be moved to or shared with another thread.
///
/// ```compile_fail
/// use hostbridge_tasks::HostContext;
///
/// let ctx = HostContext::current();
/// std::thread::spawn(move || drop(ctx));
/// ```
#[derive(Debug)]
pub struct HostContext {
    thread: ThreadId,
    name: Option<String>,
    _not_send: PhantomData<*const ()>,
}

impl HostContext {
    /// Captures the calling thread as the host context.
    pub fn current() -> Self {
        let current = thread::current();
        Self {
            thread: current.id(),
            name: current.name().map(str::to_string),
            _not_send: PhantomData,
        }
    }

    /// Thread this context belongs to.
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    /// Thread name, if the host named its thread.
    pub fn thread_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
