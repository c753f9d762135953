//! HTTP method slots for a single path.
//!
//! This module provides [`MethodRouter`] which maps the four routable HTTP
//! methods to a value for one path in the tree.

use http::Method;

/// Maps GET, POST, PUT and DELETE to a value for a single path.
///
/// # Example
///
/// ```rust
/// use hostbridge_router::MethodRouter;
/// use http::Method;
///
/// let router = MethodRouter::new().get("listSetups").post("createSetup");
///
/// assert_eq!(router.lookup(&Method::GET), Some(&"listSetups"));
/// assert_eq!(router.lookup(&Method::POST), Some(&"createSetup"));
/// assert_eq!(router.lookup(&Method::DELETE), None);
/// assert_eq!(router.allowed_methods(), vec![Method::GET, Method::POST]);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRouter<T> {
    /// GET target
    get: Option<T>,
    /// POST target
    post: Option<T>,
    /// PUT target
    put: Option<T>,
    /// DELETE target
    delete: Option<T>,
}

impl<T> Default for MethodRouter<T> {
    fn default() -> Self {
        Self {
            get: None,
            post: None,
            put: None,
            delete: None,
        }
    }
}

impl<T> MethodRouter<T> {
    /// Creates a new empty method router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `method` can be routed at all.
    #[must_use]
    pub fn is_supported(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::POST | Method::PUT | Method::DELETE
        )
    }

    /// Registers a GET target.
    #[must_use]
    pub fn get(mut self, value: T) -> Self {
        self.get = Some(value);
        self
    }

    /// Registers a POST target.
    #[must_use]
    pub fn post(mut self, value: T) -> Self {
        self.post = Some(value);
        self
    }

    /// Registers a PUT target.
    #[must_use]
    pub fn put(mut self, value: T) -> Self {
        self.put = Some(value);
        self
    }

    /// Registers a DELETE target.
    #[must_use]
    pub fn delete(mut self, value: T) -> Self {
        self.delete = Some(value);
        self
    }

    fn slot_mut(&mut self, method: &Method) -> Option<&mut Option<T>> {
        match *method {
            Method::GET => Some(&mut self.get),
            Method::POST => Some(&mut self.post),
            Method::PUT => Some(&mut self.put),
            Method::DELETE => Some(&mut self.delete),
            _ => None,
        }
    }

    /// Sets the target for `method` unless one is already present.
    ///
    /// Returns the rejected value when the slot is occupied or the method is
    /// not routable; the existing target is never overwritten.
    pub fn try_insert(&mut self, method: &Method, value: T) -> Result<(), T> {
        match self.slot_mut(method) {
            Some(slot) if slot.is_none() => {
                *slot = Some(value);
                Ok(())
            }
            _ => Err(value),
        }
    }

    /// Returns the target registered for `method`.
    #[must_use]
    pub fn lookup(&self, method: &Method) -> Option<&T> {
        match *method {
            Method::GET => self.get.as_ref(),
            Method::POST => self.post.as_ref(),
            Method::PUT => self.put.as_ref(),
            Method::DELETE => self.delete.as_ref(),
            _ => None,
        }
    }

    /// Returns true if any methods are registered.
    #[must_use]
    pub fn has_any_method(&self) -> bool {
        self.get.is_some() || self.post.is_some() || self.put.is_some() || self.delete.is_some()
    }

    /// Returns a list of allowed methods for this path.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods = Vec::with_capacity(4);
        if self.get.is_some() {
            methods.push(Method::GET);
        }
        if self.post.is_some() {
            methods.push(Method::POST);
        }
        if self.put.is_some() {
            methods.push(Method::PUT);
        }
        if self.delete.is_some() {
            methods.push(Method::DELETE);
        }
        methods
    }
}
