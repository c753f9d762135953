//! Handler modules: the static discovery unit.
//!
//! Each module is compiled in and listed in a [`ModuleCatalog`]. Discovery
//! asks every module for its descriptors; a module that errors or panics is
//! left out without affecting the others.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::{DiscoveryError, HandlerDescriptor};

/// What a module sees while loading.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    name: String,
    config: Arc<Value>,
}

impl ModuleContext {
    /// Creates a context for `name` with its settings blob.
    pub fn new(name: impl Into<String>, config: Arc<Value>) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module's settings blob (`Null` if not configured).
    #[must_use]
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Convenience accessor for a string setting.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// A compiled-in group of handlers.
///
/// # Example
///
/// ```
/// use hostbridge_core::{
///     Category, DiscoveryError, EndpointKey, FnHandler, HandlerDescriptor, HandlerModule,
///     ModuleContext,
/// };
/// use http::Method;
/// use serde_json::json;
///
/// struct Geometry;
///
/// impl HandlerModule for Geometry {
///     fn name(&self) -> &str {
///         "geometry"
///     }
///
///     fn load(&self, ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
///         let units = ctx.setting("units").unwrap_or("mm").to_string();
///         Ok(vec![HandlerDescriptor::builder(
///             Category::Design,
///             "box",
///             FnHandler::new(move |_req| Ok(json!({ "units": units }))),
///         )
///         .method(Method::POST)
///         .endpoint(EndpointKey::new(Category::Design, "geometry", "box"))
///         .host_thread()
///         .build()])
///     }
/// }
/// ```
pub trait HandlerModule: Send + Sync {
    /// Module name. Also the key into `module_config`.
    fn name(&self) -> &str;

    /// Produces the module's descriptors.
    fn load(&self, ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError>;
}

/// Ordered list of modules to discover.
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    modules: Vec<Arc<dyn HandlerModule>>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style add.
    #[must_use]
    pub fn with(mut self, module: impl HandlerModule + 'static) -> Self {
        self.add(module);
        self
    }

    /// Adds a module.
    pub fn add(&mut self, module: impl HandlerModule + 'static) {
        self.modules.push(Arc::new(module));
    }

    /// Iterates modules in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn HandlerModule>> {
        self.modules.iter()
    }

    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|m| m.name().to_string()))
            .finish()
    }
}
