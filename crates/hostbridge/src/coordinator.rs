//! The integration coordinator.
//!
//! [`Coordinator`] owns the bridge's lifecycle. It loads handler modules,
//! validates them against the configuration, mounts their routes, starts the
//! task queue, applies configuration changes while running, and tears
//! everything down again.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hostbridge::prelude::*;
//!
//! # async fn example(catalog: ModuleCatalog) -> Result<(), Box<dyn std::error::Error>> {
//! let config = hostbridge::load_config("hostbridge.toml")?;
//! let bridge = Arc::new(Coordinator::builder().catalog(catalog).build());
//! bridge.initialize(config)?;
//!
//! // Host side, from the host's idle callback:
//! // bridge.pump(&HostContext::current());
//!
//! let server = bridge.http_server().ok_or("not running")?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hostbridge_config::{
    BridgeConfig, ConfigChange, ConfigError, ConfigLoader, ConfigStore, ConfigWatcher, ShutdownPolicy,
};
use hostbridge_core::{
    Capability, CapabilitySet, Category, EndpointKey, HandlerModule, HandlerRegistry, ModuleCatalog,
};
use hostbridge_router::{PathPattern, RouteTable};
use hostbridge_server::{Dispatcher, HttpServer, Middleware};
use hostbridge_tasks::{DrainReport, HostContext, QueueError, TaskQueue};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::error::{InitError, Stage, StageFailure, UpdateError};
use crate::status::{BridgeStatus, Lifecycle, ShutdownReport, ValidationReport};

/// Prefix for environment overrides, e.g. `HOSTBRIDGE__SERVER_CONFIG__PORT`.
pub const ENV_PREFIX: &str = "HOSTBRIDGE";

/// Loads configuration from `path` with environment overrides applied.
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig, ConfigError> {
    ConfigLoader::new()
        .with_dotenv()
        .with_file(path)?
        .with_env_prefix(ENV_PREFIX)
        .load()
}

/// Everything that exists while the bridge runs.
struct Runtime {
    store: Arc<ConfigStore>,
    registry: Arc<HandlerRegistry>,
    queue: Arc<TaskQueue>,
    dispatcher: Arc<Dispatcher>,
    discovery_failures: Vec<String>,
}

struct State {
    lifecycle: Lifecycle,
    runtime: Option<Arc<Runtime>>,
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder {
    catalog: ModuleCatalog,
    capabilities: CapabilitySet,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl CoordinatorBuilder {
    /// Adds a handler module.
    pub fn module(mut self, module: impl HandlerModule + 'static) -> Self {
        self.catalog.add(module);
        self
    }

    /// Replaces the module catalog.
    pub fn catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the capabilities the runtime provides. Defaults to all of them.
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Removes one capability from what the runtime provides.
    pub fn without(mut self, capability: Capability) -> Self {
        self.capabilities = self.capabilities.iter().filter(|c| *c != capability).collect();
        self
    }

    /// Adds global middleware, run before every handler in the order added.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Builds an uninitialized coordinator.
    pub fn build(self) -> Coordinator {
        Coordinator {
            catalog: self.catalog,
            capabilities: self.capabilities,
            middleware: self.middleware,
            state: RwLock::new(State {
                lifecycle: Lifecycle::Created,
                runtime: None,
            }),
        }
    }
}

/// Wires the registry, router and task queue together.
pub struct Coordinator {
    catalog: ModuleCatalog,
    capabilities: CapabilitySet,
    middleware: Vec<Arc<dyn Middleware>>,
    state: RwLock<State>,
}

impl Coordinator {
    /// Starts building a coordinator.
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder {
            catalog: ModuleCatalog::new(),
            capabilities: CapabilitySet::all(),
            middleware: Vec::new(),
        }
    }

    /// Brings the bridge up.
    ///
    /// Runs, in order: configuration validation, module discovery, descriptor
    /// validation, route table construction, queue start and a status report.
    /// Every stage that can run is run, so the error lists every failed
    /// check. A module that fails to load is reported in
    /// [`BridgeStatus::discovery_failures`] and does not stop startup.
    ///
    /// May be called again after a failure. Fails if already running or
    /// stopped.
    pub fn initialize(&self, config: BridgeConfig) -> Result<(), InitError> {
        let mut state = self.state.write();
        if matches!(state.lifecycle, Lifecycle::Running | Lifecycle::Stopped) {
            return Err(InitError {
                failures: vec![StageFailure::new(
                    Stage::Lifecycle,
                    format!("cannot initialize a {} bridge", state.lifecycle),
                )],
            });
        }

        let mut failures = Vec::new();

        // config
        let store = match ConfigStore::new(config.clone()) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                failures.extend(e.problems().into_iter().map(|p| StageFailure::new(Stage::Config, p)));
                None
            }
        };
        tracing::debug!(stage = %Stage::Config, failures = failures.len(), "stage finished");

        // discovery
        let mut registry = HandlerRegistry::new(&config.module_config);
        let discovered = registry.discover(&self.catalog);
        let discovery_failures: Vec<String> = discovered.failures.iter().map(ToString::to_string).collect();
        tracing::debug!(
            stage = %Stage::Discovery,
            modules = discovered.modules_loaded,
            descriptors = discovered.descriptors.len(),
            failures = discovery_failures.len(),
            "stage finished"
        );

        // validation
        for descriptor in discovered.descriptors {
            let checked = HandlerRegistry::validate(&descriptor, self.capabilities, &config.endpoints)
                .and_then(|()| registry.register(descriptor).map(drop));
            if let Err(e) = checked {
                failures.push(StageFailure::new(Stage::Validation, e.to_string()));
            }
        }
        tracing::debug!(stage = %Stage::Validation, handlers = registry.len(), "stage finished");

        // routes
        let mut table: RouteTable<String> = RouteTable::new();
        for descriptor in registry.iter() {
            let meta = descriptor.meta();
            let (Some(method), Some(path)) = (
                meta.method.clone(),
                meta.endpoint.as_ref().and_then(|key| config.endpoints.path(key)),
            ) else {
                continue;
            };
            if let Err(e) = table.insert(method, path, descriptor.id()) {
                failures.push(StageFailure::new(Stage::Routes, format!("{}: {e}", descriptor.id())));
            }
        }
        tracing::debug!(stage = %Stage::Routes, routes = table.len(), "stage finished");

        let store = match store {
            Some(store) if failures.is_empty() => store,
            _ => return Err(Self::fail(&mut state, failures)),
        };

        // queue, then mount the checked routes on its dispatcher
        let registry = Arc::new(registry);
        let queue = Arc::new(TaskQueue::from_config(&config.queue));
        let mut dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&queue), &config.server_config);
        for middleware in &self.middleware {
            dispatcher.add_middleware(Arc::clone(middleware));
        }
        for descriptor in registry.iter() {
            if let Err(e) = dispatcher.mount(Arc::clone(descriptor), &config.endpoints, Vec::new()) {
                failures.push(StageFailure::new(Stage::Routes, e.to_string()));
            }
        }
        if !failures.is_empty() {
            return Err(Self::fail(&mut state, failures));
        }
        let dispatcher = Arc::new(dispatcher);
        store.add_listener(registry.clone());
        store.add_listener(dispatcher.clone());
        tracing::info!(
            capacity = config.queue.capacity,
            drain_batch = config.queue.drain_batch,
            shutdown_policy = ?config.queue.shutdown_policy,
            "task queue started"
        );

        // status
        let runtime = Arc::new(Runtime {
            store,
            registry,
            queue,
            dispatcher,
            discovery_failures,
        });
        let status = Self::status_of(Lifecycle::Running, Some(&runtime));
        state.runtime = Some(runtime);
        state.lifecycle = Lifecycle::Running;
        tracing::info!(
            handlers = status.handler_count(),
            routes = status.routes,
            config_version = status.config_version,
            discovery_failures = status.discovery_failures.len(),
            "bridge initialized"
        );
        Ok(())
    }

    fn fail(state: &mut State, failures: Vec<StageFailure>) -> InitError {
        for failure in &failures {
            tracing::error!(stage = %failure.stage, problem = %failure.message, "initialization check failed");
        }
        state.lifecycle = Lifecycle::Failed;
        state.runtime = None;
        InitError { failures }
    }

    fn running(&self) -> Result<Arc<Runtime>, UpdateError> {
        let state = self.state.read();
        match (&state.runtime, state.lifecycle) {
            (Some(runtime), Lifecycle::Running) => Ok(Arc::clone(runtime)),
            _ => Err(UpdateError::NotRunning),
        }
    }

    /// Moves one endpoint to a new path without restarting.
    ///
    /// The change is checked against the whole configuration and the full
    /// route table first; on any problem nothing changes. On success the
    /// registry and the router pick up the new snapshot before this returns.
    pub fn update_configuration(
        &self,
        category: &str,
        group: &str,
        name: &str,
        new_path: &str,
    ) -> Result<ConfigChange, UpdateError> {
        let runtime = self.running()?;
        let category: Category = category.parse()?;
        let key = EndpointKey::new(category, group, name);

        let change = runtime.store.update(|current| -> Result<BridgeConfig, UpdateError> {
            let next = current.with_endpoint_path(&key, new_path)?;
            runtime.dispatcher.plan_routes(&next.endpoints)?;
            Ok(next)
        })?;
        warn_restart_required(&change);
        tracing::info!(endpoint = %key, path = new_path, version = change.to_version, "endpoint updated");
        Ok(change)
    }

    /// Replaces the whole configuration without restarting.
    ///
    /// Refused if any registered handler's endpoint disappears or the new
    /// paths conflict.
    pub fn reload(&self, config: BridgeConfig) -> Result<ConfigChange, UpdateError> {
        let runtime = self.running()?;

        let change = runtime.store.update(|_| -> Result<BridgeConfig, UpdateError> {
            let orphaned: Vec<String> = runtime
                .registry
                .iter()
                .filter_map(|descriptor| {
                    let key = descriptor.meta().endpoint.as_ref()?;
                    (!config.endpoints.contains(key))
                        .then(|| format!("{} needs endpoint {key}", descriptor.id()))
                })
                .collect();
            if !orphaned.is_empty() {
                return Err(UpdateError::Orphaned { problems: orphaned });
            }
            runtime.dispatcher.plan_routes(&config.endpoints)?;
            Ok(config)
        })?;
        warn_restart_required(&change);
        Ok(change)
    }

    /// Reloads from a file. See [`load_config`].
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<ConfigChange, UpdateError> {
        self.reload(load_config(path)?)
    }

    /// Reloads whenever `path` changes on disk.
    ///
    /// Rejected reloads are logged and the previous configuration stays
    /// active. The task ends when the returned handle is aborted.
    pub fn watch_config(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
        debounce: Duration,
    ) -> Result<JoinHandle<()>, ConfigError> {
        let watcher = ConfigWatcher::builder(path).with_debounce(debounce).build()?;
        let bridge = Arc::clone(self);
        Ok(tokio::spawn(watcher.run(move |event| {
            match bridge.reload_from(&event.path) {
                Ok(change) if change.is_empty() => {
                    tracing::debug!(path = %event.path.display(), "configuration file touched, nothing changed");
                }
                Ok(change) => tracing::info!(version = change.to_version, "configuration reloaded"),
                Err(e) => tracing::warn!(error = %e, "reload rejected, keeping current configuration"),
            }
        })))
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.read().lifecycle
    }

    /// Aggregate status.
    pub fn status(&self) -> BridgeStatus {
        let state = self.state.read();
        Self::status_of(state.lifecycle, state.runtime.as_ref())
    }

    fn status_of(state: Lifecycle, runtime: Option<&Arc<Runtime>>) -> BridgeStatus {
        let Some(runtime) = runtime else {
            return BridgeStatus::idle(state);
        };
        BridgeStatus {
            state,
            handlers: runtime.registry.counts_by_category(),
            routes: runtime.dispatcher.route_count(),
            queue: Some(runtime.queue.stats()),
            config_version: Some(runtime.store.snapshot().version()),
            discovery_failures: runtime.discovery_failures.clone(),
        }
    }

    /// Re-checks handlers and routes against the current configuration.
    /// Changes nothing.
    pub fn validate(&self) -> ValidationReport {
        let Ok(runtime) = self.running() else {
            return ValidationReport {
                problems: vec![format!("bridge is {}", self.lifecycle())],
                ..ValidationReport::default()
            };
        };

        let snapshot = runtime.store.snapshot();
        let routes = runtime.dispatcher.routes();
        let mut report = ValidationReport {
            handlers_checked: runtime.registry.len(),
            routes_checked: routes.len(),
            problems: snapshot.problems(),
        };

        for descriptor in runtime.registry.iter() {
            if let Err(e) = HandlerRegistry::validate(descriptor, self.capabilities, &snapshot.endpoints) {
                report.problems.push(e.to_string());
                continue;
            }
            let meta = descriptor.meta();
            let (Some(method), Some(path)) = (
                meta.method.as_ref(),
                meta.endpoint.as_ref().and_then(|key| snapshot.endpoints.path(key)),
            ) else {
                continue;
            };
            let bound = PathPattern::parse(path)
                .ok()
                .and_then(|pattern| routes.find(method, &pattern).map(|entry| entry.value().descriptor().id()));
            if bound.as_deref() != Some(descriptor.id().as_str()) {
                report
                    .problems
                    .push(format!("{} is not routed at {method} {path}", descriptor.id()));
            }
        }

        if let Err(e) = runtime.dispatcher.plan_routes(&snapshot.endpoints) {
            report.problems.push(format!("route table: {e}"));
        }
        report
    }

    /// Runs one batch of queued tasks. Call from the host thread's loop.
    pub fn pump(&self, host: &HostContext) -> Result<DrainReport, QueueError> {
        let runtime = self.running().map_err(|_| QueueError::Closed)?;
        let batch = runtime.store.snapshot().queue.drain_batch;
        runtime.queue.drain(host, batch)
    }

    /// Stops the bridge.
    ///
    /// Stops dispatching and closes the queue, then runs the remaining
    /// tasks if the policy is `drain` and `host` is given, and discards
    /// whatever is left. Finally releases every handler; none is called
    /// after that. Never fails; teardown failures are reported.
    /// Calling it again returns an empty report.
    pub fn shutdown(&self, host: Option<&HostContext>) -> ShutdownReport {
        let runtime = {
            let mut state = self.state.write();
            if state.lifecycle == Lifecycle::Stopped {
                return ShutdownReport::default();
            }
            state.lifecycle = Lifecycle::Stopped;
            match state.runtime.clone() {
                Some(runtime) => runtime,
                None => return ShutdownReport::default(),
            }
        };

        let queue_config = runtime.store.snapshot().queue.clone();
        runtime.dispatcher.close();
        runtime.queue.close();

        let mut report = ShutdownReport {
            policy: queue_config.shutdown_policy,
            ..ShutdownReport::default()
        };
        if queue_config.shutdown_policy == ShutdownPolicy::Drain {
            match host {
                Some(host) => loop {
                    match runtime.queue.drain(host, queue_config.drain_batch) {
                        Ok(drained) if drained.executed > 0 => report.drained += drained.executed,
                        Ok(_) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "cannot drain from this thread, discarding remaining tasks");
                            break;
                        }
                    }
                },
                None => tracing::warn!("drain policy set but no host context given, discarding remaining tasks"),
            }
        }
        report.discarded = runtime.queue.discard_pending();
        report.teardown_failures = runtime.registry.release_all();

        tracing::info!(
            drained = report.drained,
            discarded = report.discarded,
            teardown_failures = report.teardown_failures.len(),
            "bridge stopped"
        );
        report
    }

    /// The dispatcher, while running or after shutdown.
    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.state.read().runtime.as_ref().map(|r| Arc::clone(&r.dispatcher))
    }

    /// The configuration store, for subscriptions.
    pub fn config_store(&self) -> Option<Arc<ConfigStore>> {
        self.state.read().runtime.as_ref().map(|r| Arc::clone(&r.store))
    }

    /// An HTTP server bound to the configured `host:port`.
    pub fn http_server(&self) -> Option<HttpServer> {
        let runtime = self.running().ok()?;
        let addr = runtime.store.snapshot().server_config.addr();
        Some(HttpServer::new(Arc::clone(&runtime.dispatcher), addr))
    }
}

fn warn_restart_required(change: &ConfigChange) {
    if !change.restart_required.is_empty() {
        tracing::warn!(
            version = change.to_version,
            settings = ?change.restart_required,
            "configuration accepted, but these settings only take effect after a restart"
        );
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("modules", &self.catalog.len())
            .field("capabilities", &self.capabilities)
            .field("state", &self.lifecycle())
            .finish_non_exhaustive()
    }
}
