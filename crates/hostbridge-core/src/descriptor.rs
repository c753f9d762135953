//! Handler descriptors.
//!
//! A [`HandlerDescriptor`] is created by a [`HandlerModule`](crate::HandlerModule)
//! at discovery time and is immutable once the registry accepts it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::{Capability, CapabilitySet, Category, EndpointKey, Handler};

/// Task priority. Higher values run first.
///
/// # Example
///
/// ```
/// use hostbridge_core::Priority;
///
/// assert!(Priority::HIGH > Priority::NORMAL);
/// assert_eq!(Priority::default(), Priority::NORMAL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Background work.
    pub const LOW: Self = Self(0);
    /// Default for requests.
    pub const NORMAL: Self = Self(50);
    /// Interactive work.
    pub const HIGH: Self = Self(100);
    /// Runs before everything else.
    pub const CRITICAL: Self = Self(255);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a handler runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    /// On the server task that received the request.
    #[default]
    Inline,
    /// On the host thread, via the task queue.
    HostThread,
}

/// Metadata a handler declares about itself.
#[derive(Debug, Clone, Default)]
pub struct HandlerMeta {
    /// HTTP method the handler answers.
    pub method: Option<Method>,
    /// Endpoint whose configured path the handler is mounted at.
    pub endpoint: Option<EndpointKey>,
    /// Capabilities the handler needs.
    pub capabilities: CapabilitySet,
    /// Where the handler runs.
    pub execution: Execution,
    /// Queue priority for host-thread execution.
    pub priority: Priority,
    /// Wait bound overriding `server_config.timeout_ms`.
    pub timeout: Option<Duration>,
    /// Module whose settings blob the handler receives.
    pub module: Option<String>,
}

impl HandlerMeta {
    /// Capabilities required including those implied by [`Execution`].
    #[must_use]
    pub fn required_capabilities(&self) -> CapabilitySet {
        match self.execution {
            Execution::HostThread => self.capabilities.with(Capability::HostApi),
            Execution::Inline => self.capabilities,
        }
    }
}

/// A discovered handler: identity, callable and metadata.
///
/// # Example
///
/// ```
/// use hostbridge_core::{Category, EndpointKey, Execution, FnHandler, HandlerDescriptor};
/// use http::Method;
/// use serde_json::json;
///
/// let descriptor = HandlerDescriptor::builder(
///     Category::Design,
///     "box",
///     FnHandler::new(|_req| Ok(json!({"created": true}))),
/// )
/// .method(Method::POST)
/// .endpoint(EndpointKey::new(Category::Design, "geometry", "box"))
/// .host_thread()
/// .build();
///
/// assert_eq!(descriptor.id(), "design/box");
/// assert_eq!(descriptor.meta().execution, Execution::HostThread);
/// ```
#[derive(Clone)]
pub struct HandlerDescriptor {
    category: Category,
    name: String,
    handler: Arc<dyn Handler>,
    meta: HandlerMeta,
}

impl HandlerDescriptor {
    /// Starts building a descriptor.
    pub fn builder(
        category: Category,
        name: impl Into<String>,
        handler: impl Handler,
    ) -> HandlerDescriptorBuilder {
        HandlerDescriptorBuilder {
            descriptor: Self {
                category,
                name: name.into(),
                handler: Arc::new(handler),
                meta: HandlerMeta::default(),
            },
        }
    }

    /// Handler category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Name, unique within the category.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `category/name`, used in logs.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// The callable.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Declared metadata.
    #[must_use]
    pub fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    /// Returns true if the handler must run on the host thread.
    #[must_use]
    pub fn requires_host_thread(&self) -> bool {
        self.meta.execution == Execution::HostThread
    }

    /// Attributes the descriptor to `module` unless it names one already.
    pub(crate) fn in_module(mut self, module: &str) -> Self {
        self.meta.module.get_or_insert_with(|| module.to_string());
        self
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("category", &self.category)
            .field("name", &self.name)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HandlerDescriptor`].
pub struct HandlerDescriptorBuilder {
    descriptor: HandlerDescriptor,
}

impl HandlerDescriptorBuilder {
    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.descriptor.meta.method = Some(method);
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: EndpointKey) -> Self {
        self.descriptor.meta.endpoint = Some(endpoint);
        self
    }

    /// Adds a required capability.
    #[must_use]
    pub fn requires(mut self, capability: Capability) -> Self {
        self.descriptor.meta.capabilities.insert(capability);
        self
    }

    /// Marks the handler as host-thread only.
    #[must_use]
    pub fn host_thread(mut self) -> Self {
        self.descriptor.meta.execution = Execution::HostThread;
        self
    }

    /// Sets the queue priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.descriptor.meta.priority = priority;
        self
    }

    /// Overrides the wait bound.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.meta.timeout = Some(timeout);
        self
    }

    /// Sets the module whose settings the handler receives.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.descriptor.meta.module = Some(module.into());
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(self) -> HandlerDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandlerError, HandlerRequest};
    use serde_json::Value;

    struct Noop;

    impl Handler for Noop {
        fn call(&self, _request: HandlerRequest) -> Result<Value, HandlerError> {
            Ok(Value::Null)
        }
    }

    fn noop() -> Noop {
        Noop
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::CRITICAL > Priority::HIGH);
        assert!(Priority::HIGH > Priority::NORMAL);
        assert!(Priority::NORMAL > Priority::LOW);
    }

    #[test]
    fn test_host_thread_implies_host_api() {
        let descriptor = HandlerDescriptor::builder(Category::Manufacture, "setup", noop())
            .host_thread()
            .requires(Capability::Document)
            .build();
        let required = descriptor.meta().required_capabilities();
        assert!(required.contains(Capability::HostApi));
        assert!(required.contains(Capability::Document));
        assert!(descriptor.requires_host_thread());
    }

    #[test]
    fn test_inline_defaults() {
        let descriptor = HandlerDescriptor::builder(Category::System, "health", noop()).build();
        assert_eq!(descriptor.meta().execution, Execution::Inline);
        assert_eq!(descriptor.meta().priority, Priority::NORMAL);
        assert!(descriptor.meta().required_capabilities().is_empty());
        assert!(descriptor.meta().method.is_none());
    }
}
