//! The handler registry.
//!
//! The registry is filled once at startup: [`discover`](HandlerRegistry::discover)
//! collects descriptors from every module, [`validate`](HandlerRegistry::validate)
//! checks each against the runtime and the endpoint map, and
//! [`register`](HandlerRegistry::register) accepts it. After that the registry
//! is shared read-only; only the module settings view is replaced when the
//! configuration changes.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use hostbridge_config::{ConfigChange, ConfigListener, ConfigSnapshot, EndpointMap, ModuleConfigMap};
use http::Method;
use serde::Serialize;
use serde_json::Value;

use crate::{
    panic_message, CapabilitySet, Category, DiscoveryError, HandlerDescriptor, ModuleCatalog,
    ModuleContext, ValidationError,
};

/// Module settings as handed to handlers.
type ModuleView = HashMap<String, Arc<Value>>;

/// Outcome of running discovery over a catalog.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Descriptors from every module that loaded, in catalog order.
    pub descriptors: Vec<HandlerDescriptor>,
    /// Modules that failed, in catalog order.
    pub failures: Vec<DiscoveryError>,
    /// Number of modules that loaded.
    pub modules_loaded: usize,
}

/// A handler whose teardown failed during [`HandlerRegistry::release_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    /// Handler id (`category/name`).
    pub handler: String,
    /// What went wrong.
    pub reason: String,
}

/// Registered handlers, by category and name.
pub struct HandlerRegistry {
    descriptors: Vec<Arc<HandlerDescriptor>>,
    index: HashMap<(Category, String), usize>,
    modules: ArcSwap<ModuleView>,
    released: AtomicBool,
}

impl HandlerRegistry {
    /// Creates an empty registry with the given module settings.
    #[must_use]
    pub fn new(module_config: &ModuleConfigMap) -> Self {
        Self {
            descriptors: Vec::new(),
            index: HashMap::new(),
            modules: ArcSwap::from_pointee(module_view(module_config)),
            released: AtomicBool::new(false),
        }
    }

    /// Loads every module in `catalog`.
    ///
    /// A module that returns an error or panics is recorded in
    /// [`DiscoveryReport::failures`] and skipped; the remaining modules still
    /// load.
    pub fn discover(&self, catalog: &ModuleCatalog) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for module in catalog.iter() {
            let name = module.name().to_string();
            let ctx = ModuleContext::new(&name, self.module_config(&name));

            let outcome = catch_unwind(AssertUnwindSafe(|| module.load(&ctx)))
                .unwrap_or_else(|payload| {
                    Err(DiscoveryError::new(
                        &name,
                        format!("panicked: {}", panic_message(payload.as_ref())),
                    ))
                });

            match outcome {
                Ok(descriptors) => {
                    tracing::info!(
                        module = %name,
                        handlers = descriptors.len(),
                        "handler module loaded"
                    );
                    report.modules_loaded += 1;
                    report
                        .descriptors
                        .extend(descriptors.into_iter().map(|d| d.in_module(&name)));
                }
                Err(error) => {
                    tracing::warn!(module = %name, error = %error.reason, "handler module rejected");
                    report.failures.push(error);
                }
            }
        }

        report
    }

    /// Checks a descriptor against the runtime and the endpoint map.
    ///
    /// Rejects descriptors without a routable method or an endpoint, whose
    /// endpoint has no configured path or lies in another category, and whose
    /// required capabilities are not all in `provided`.
    pub fn validate(
        descriptor: &HandlerDescriptor,
        provided: CapabilitySet,
        endpoints: &EndpointMap,
    ) -> Result<(), ValidationError> {
        let handler = descriptor.id();
        let meta = descriptor.meta();

        let method = meta
            .method
            .as_ref()
            .ok_or_else(|| ValidationError::MissingMethod {
                handler: handler.clone(),
            })?;
        if !matches!(*method, Method::GET | Method::POST | Method::PUT | Method::DELETE) {
            return Err(ValidationError::UnsupportedMethod {
                handler,
                method: method.clone(),
            });
        }

        let endpoint = meta
            .endpoint
            .as_ref()
            .ok_or_else(|| ValidationError::MissingEndpoint {
                handler: handler.clone(),
            })?;
        if endpoint.category != descriptor.category() {
            return Err(ValidationError::CategoryMismatch {
                handler,
                category: descriptor.category(),
                endpoint: endpoint.clone(),
            });
        }
        if !endpoints.contains(endpoint) {
            return Err(ValidationError::UnknownEndpoint {
                handler,
                endpoint: endpoint.clone(),
            });
        }

        let missing = meta.required_capabilities().missing_from(provided);
        if !missing.is_empty() {
            return Err(ValidationError::MissingCapabilities { handler, missing });
        }

        Ok(())
    }

    /// Accepts a descriptor.
    ///
    /// A second handler with the same category and name is rejected; the
    /// first one stays registered.
    pub fn register(
        &mut self,
        descriptor: HandlerDescriptor,
    ) -> Result<Arc<HandlerDescriptor>, ValidationError> {
        let key = (descriptor.category(), descriptor.name().to_string());
        if self.index.contains_key(&key) {
            tracing::warn!(handler = %descriptor.id(), "duplicate handler rejected");
            return Err(ValidationError::DuplicateHandler {
                category: key.0,
                name: key.1,
            });
        }

        let descriptor = Arc::new(descriptor);
        tracing::debug!(handler = %descriptor.id(), "handler registered");
        self.index.insert(key, self.descriptors.len());
        self.descriptors.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Looks up a handler.
    #[must_use]
    pub fn get(&self, category: Category, name: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.index
            .get(&(category, name.to_string()))
            .and_then(|&i| self.descriptors.get(i))
    }

    /// Handlers in `category`, in registration order.
    pub fn get_by_category(&self, category: Category) -> impl Iterator<Item = &Arc<HandlerDescriptor>> {
        self.descriptors
            .iter()
            .filter(move |d| d.category() == category)
    }

    /// Every handler, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<HandlerDescriptor>> {
        self.descriptors.iter()
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Handler count per category.
    #[must_use]
    pub fn counts_by_category(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for descriptor in &self.descriptors {
            *counts.entry(descriptor.category()).or_insert(0) += 1;
        }
        counts
    }

    /// Settings blob for a module (`Null` if not configured).
    #[must_use]
    pub fn module_config(&self, module: &str) -> Arc<Value> {
        self.modules
            .load()
            .get(module)
            .cloned()
            .unwrap_or_else(|| Arc::new(Value::Null))
    }

    /// Settings blob for the module a handler declares.
    #[must_use]
    pub fn module_config_for(&self, descriptor: &HandlerDescriptor) -> Arc<Value> {
        descriptor
            .meta()
            .module
            .as_deref()
            .map_or_else(|| Arc::new(Value::Null), |m| self.module_config(m))
    }

    /// Calls every handler's teardown, in registration order.
    ///
    /// Failures and panics are collected and returned, never raised. Only the
    /// first call tears anything down.
    pub fn release_all(&self) -> Vec<TeardownFailure> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }

        let mut failures = Vec::new();
        for descriptor in &self.descriptors {
            let result = catch_unwind(AssertUnwindSafe(|| descriptor.handler().teardown()));
            let reason = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            tracing::warn!(handler = %descriptor.id(), %reason, "handler teardown failed");
            failures.push(TeardownFailure {
                handler: descriptor.id(),
                reason,
            });
        }

        tracing::info!(
            handlers = self.descriptors.len(),
            failed = failures.len(),
            "handlers released"
        );
        failures
    }
}

impl ConfigListener for HandlerRegistry {
    fn name(&self) -> &str {
        "handler-registry"
    }

    fn on_change(&self, snapshot: &ConfigSnapshot, change: &ConfigChange) {
        if change.modules.is_empty() {
            return;
        }
        self.modules.store(Arc::new(module_view(&snapshot.module_config)));
        tracing::info!(modules = ?change.modules, "module settings updated");
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.descriptors.iter().map(|d| d.id()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn module_view(config: &ModuleConfigMap) -> ModuleView {
    config
        .iter()
        .map(|(name, value)| (name.clone(), Arc::new(value.clone())))
        .collect()
}
