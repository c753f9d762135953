//! Handler trait for request processing.
//!
//! The [`Handler`] trait is the contract exposed to handler modules. A
//! handler is synchronous: host-thread handlers run inside the host's own
//! loop, where there is no async runtime to await on.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::HandlerError;

/// Normalized request handed to a handler.
#[derive(Debug, Clone, Default)]
pub struct HandlerRequest {
    /// Path parameters, by name.
    pub params: HashMap<String, String>,
    /// Parsed JSON body (`Null` if the request had none).
    pub body: Value,
    /// Settings blob of the handler's module (`Null` if not configured).
    pub module_config: Arc<Value>,
}

impl HandlerRequest {
    /// Creates a request with a body and no parameters.
    #[must_use]
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Builder-style parameter insert.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Returns a path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns a path parameter or a bad request error naming it.
    pub fn require_param(&self, name: &str) -> Result<&str, HandlerError> {
        self.param(name)
            .ok_or_else(|| HandlerError::bad_request(format!("missing path parameter: {name}")))
    }

    /// Deserializes the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(T::deserialize(&self.body)?)
    }
}

/// A unit of business logic bound to one route.
///
/// # Example
///
/// ```
/// use hostbridge_core::{Handler, HandlerError, HandlerRequest};
/// use serde_json::{json, Value};
///
/// struct GetSetup;
///
/// impl Handler for GetSetup {
///     fn call(&self, request: HandlerRequest) -> Result<Value, HandlerError> {
///         let id = request.require_param("id")?;
///         Ok(json!({ "id": id, "operations": 3 }))
///     }
/// }
///
/// let response = GetSetup.call(HandlerRequest::default().with_param("id", "42")).unwrap();
/// assert_eq!(response["id"], "42");
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles a request.
    fn call(&self, request: HandlerRequest) -> Result<Value, HandlerError>;

    /// Releases resources held by the handler. Called once at shutdown.
    fn teardown(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// A closure-based handler.
///
/// # Example
///
/// ```
/// use hostbridge_core::{FnHandler, Handler, HandlerRequest};
/// use serde_json::json;
///
/// let handler = FnHandler::new(|_req: HandlerRequest| Ok(json!({ "status": "ok" })));
/// assert_eq!(handler.call(HandlerRequest::default()).unwrap()["status"], "ok");
/// ```
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(HandlerRequest) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    /// Creates a new function-based handler.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(HandlerRequest) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn call(&self, request: HandlerRequest) -> Result<Value, HandlerError> {
        (self.func)(request)
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Extracts a readable message from a caught panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
