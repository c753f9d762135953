//! Request dispatch.
//!
//! The [`Dispatcher`] resolves a request against the current route table,
//! runs the middleware chain and invokes the handler, either inline or by
//! enqueueing a task for the host thread and waiting on its result. Every
//! request gets exactly one [`DispatchResponse`].
//!
//! The route table is swapped atomically when endpoint paths change, so a
//! request always sees one complete table.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use hostbridge_config::{ConfigChange, ConfigListener, ConfigSnapshot, EndpointMap, ServerConfig};
use hostbridge_core::{panic_message, HandlerDescriptor, HandlerError, HandlerRegistry, HandlerRequest};
use hostbridge_router::{PathPattern, Resolution, RouteError, RouteTable};
use hostbridge_tasks::{QueueError, Task, TaskError, TaskQueue};
use http::header::{HeaderValue, ALLOW, RETRY_AFTER};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ServerError;
use crate::middleware::{BoxFuture, DispatchContext, Middleware, Next};
use crate::response::{DispatchRequest, DispatchResponse};

/// Base delay between enqueue retries; attempt `n` waits `n` times this.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// What a route is bound to.
#[derive(Clone)]
pub struct RouteTarget {
    descriptor: Arc<HandlerDescriptor>,
    middleware: Vec<Arc<dyn Middleware>>,
    follows_endpoint: bool,
}

impl RouteTarget {
    /// The bound handler.
    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    /// Route-specific middleware, in registration order.
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }
}

impl std::fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTarget")
            .field("handler", &self.descriptor.id())
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    timeout: Duration,
    max_retries: u32,
}

impl From<&ServerConfig> for Settings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
        }
    }
}

/// Runs handlers once a route and its middleware are done.
struct Invoker {
    registry: Arc<HandlerRegistry>,
    queue: Arc<TaskQueue>,
    settings: ArcSwap<Settings>,
}

impl Invoker {
    async fn invoke(
        &self,
        route: &str,
        descriptor: &HandlerDescriptor,
        params: HashMap<String, String>,
        body: Value,
    ) -> DispatchResponse {
        let request = HandlerRequest {
            params,
            body,
            module_config: self.registry.module_config_for(descriptor),
        };

        if descriptor.requires_host_thread() {
            self.run_on_host(route, descriptor, request).await
        } else {
            Self::run_inline(route, descriptor, request)
        }
    }

    fn run_inline(route: &str, descriptor: &HandlerDescriptor, request: HandlerRequest) -> DispatchResponse {
        let handler = descriptor.handler();
        match catch_unwind(AssertUnwindSafe(|| handler.call(request))) {
            Ok(Ok(value)) => DispatchResponse::ok(value),
            Ok(Err(error)) => handler_error_response(route, &error),
            Err(payload) => {
                tracing::error!(route, panic = %panic_message(payload.as_ref()), "handler panicked");
                internal_error(route)
            }
        }
    }

    async fn run_on_host(
        &self,
        route: &str,
        descriptor: &HandlerDescriptor,
        request: HandlerRequest,
    ) -> DispatchResponse {
        let settings = **self.settings.load();
        let timeout = descriptor.meta().timeout.unwrap_or(settings.timeout);

        let mut attempt = 0;
        let handle = loop {
            let task = Task::new(route, Arc::clone(descriptor.handler()), request.clone())
                .with_priority(descriptor.meta().priority);
            match self.queue.enqueue(task) {
                Ok(handle) => break handle,
                Err(QueueError::Full { .. }) if attempt < settings.max_retries => {
                    attempt += 1;
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(QueueError::Full { capacity }) => {
                    return DispatchResponse::error(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "QUEUE_FULL",
                        format!("host task queue is full (capacity {capacity}), retry later"),
                        Some(route),
                    )
                    .with_header(RETRY_AFTER, HeaderValue::from_static("1"));
                }
                Err(QueueError::Closed) => return shutting_down(route),
                Err(error @ QueueError::WrongContext) => {
                    tracing::error!(route, %error, "unexpected enqueue failure");
                    return internal_error(route);
                }
            }
        };

        match handle.wait(timeout).await {
            Ok(value) => DispatchResponse::ok(value),
            Err(TaskError::Failed(error)) => handler_error_response(route, &error),
            Err(TaskError::Panicked(_)) => internal_error(route),
            Err(TaskError::Timeout(waited)) => DispatchResponse::error(
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                format!("host did not complete the request within {} ms", waited.as_millis()),
                Some(route),
            ),
            Err(TaskError::Discarded) => DispatchResponse::error(
                StatusCode::SERVICE_UNAVAILABLE,
                "DISCARDED",
                "request dropped during shutdown",
                Some(route),
            ),
        }
    }
}

fn handler_error_response(route: &str, error: &HandlerError) -> DispatchResponse {
    if let HandlerError::Internal {
        source: Some(source),
        ..
    } = error
    {
        tracing::error!(route, %error, source = %source, "handler failed");
    }
    DispatchResponse::error(
        error.status_code(),
        error.kind().code(),
        error.public_message(),
        Some(route),
    )
}

fn shutting_down(route: &str) -> DispatchResponse {
    DispatchResponse::error(
        StatusCode::SERVICE_UNAVAILABLE,
        "SHUTTING_DOWN",
        "the bridge is shutting down",
        Some(route),
    )
}

fn internal_error(route: &str) -> DispatchResponse {
    DispatchResponse::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "internal error",
        Some(route),
    )
}

/// Routes requests to handlers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use hostbridge_config::{ModuleConfigMap, ServerConfig};
/// use hostbridge_core::{Category, FnHandler, HandlerDescriptor, HandlerRegistry};
/// use hostbridge_server::{DispatchRequest, Dispatcher};
/// use hostbridge_tasks::TaskQueue;
/// use http::{Method, StatusCode};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(HandlerRegistry::new(&ModuleConfigMap::new()));
/// let queue = Arc::new(TaskQueue::new(16));
/// let dispatcher = Dispatcher::new(registry, queue, &ServerConfig::default());
///
/// let health = HandlerDescriptor::builder(
///     Category::System,
///     "health",
///     FnHandler::new(|_req| Ok(json!({"status": "ok"}))),
/// )
/// .build();
/// dispatcher.register_route(Method::GET, "/health", Arc::new(health)).unwrap();
///
/// let response = dispatcher.dispatch(DispatchRequest::new(Method::GET, "/health")).await;
/// assert_eq!(response.status, StatusCode::OK);
///
/// let missing = dispatcher.dispatch(DispatchRequest::new(Method::GET, "/nope")).await;
/// assert_eq!(missing.status, StatusCode::NOT_FOUND);
/// # });
/// ```
pub struct Dispatcher {
    routes: ArcSwap<RouteTable<RouteTarget>>,
    middleware: Vec<Arc<dyn Middleware>>,
    invoker: Arc<Invoker>,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty route table.
    pub fn new(registry: Arc<HandlerRegistry>, queue: Arc<TaskQueue>, server: &ServerConfig) -> Self {
        Self {
            routes: ArcSwap::from_pointee(RouteTable::new()),
            middleware: Vec::new(),
            invoker: Arc::new(Invoker {
                registry,
                queue,
                settings: ArcSwap::from_pointee(Settings::from(server)),
            }),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Adds global middleware. Runs before route middleware, in the order added.
    #[must_use]
    pub fn with_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Adds shared global middleware.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Names of global middleware, in order.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Adds a route at a fixed pattern.
    ///
    /// Fails if a route with the same method and pattern shape exists; the
    /// existing route is kept.
    pub fn register_route(
        &self,
        method: Method,
        pattern: &str,
        descriptor: Arc<HandlerDescriptor>,
    ) -> Result<String, RouteError> {
        self.register_route_with(method, pattern, descriptor, Vec::new())
    }

    /// Adds a route with its own middleware.
    pub fn register_route_with(
        &self,
        method: Method,
        pattern: &str,
        descriptor: Arc<HandlerDescriptor>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<String, RouteError> {
        let pattern = PathPattern::parse(pattern)?;
        self.insert(
            method,
            pattern,
            RouteTarget {
                descriptor,
                middleware,
                follows_endpoint: false,
            },
        )
    }

    /// Mounts a handler at its endpoint's configured path.
    ///
    /// The route moves when the endpoint's path changes in the configuration.
    pub fn mount(
        &self,
        descriptor: Arc<HandlerDescriptor>,
        endpoints: &EndpointMap,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<String, ServerError> {
        let unmountable = |reason: &str| ServerError::Unmountable {
            handler: descriptor.id(),
            reason: reason.to_string(),
        };
        let method = descriptor
            .meta()
            .method
            .clone()
            .ok_or_else(|| unmountable("no HTTP method"))?;
        let key = descriptor
            .meta()
            .endpoint
            .as_ref()
            .ok_or_else(|| unmountable("no endpoint"))?;
        let path = endpoints
            .path(key)
            .ok_or_else(|| unmountable("endpoint has no configured path"))?;
        let pattern = PathPattern::parse(path).map_err(RouteError::from)?;

        let id = self.insert(
            method,
            pattern,
            RouteTarget {
                descriptor: Arc::clone(&descriptor),
                middleware,
                follows_endpoint: true,
            },
        )?;
        tracing::debug!(route = %id, handler = %descriptor.id(), "route mounted");
        Ok(id)
    }

    fn insert(&self, method: Method, pattern: PathPattern, target: RouteTarget) -> Result<String, RouteError> {
        let _guard = self.write_lock.lock();
        let current = self.routes.load();
        let mut table: RouteTable<RouteTarget> = (**current).clone();
        let id = format!("{method} {pattern}");
        table.insert_pattern(method, pattern, target)?;
        self.routes.store(Arc::new(table));
        Ok(id)
    }

    /// Builds the route table that `endpoints` would produce, without
    /// installing it.
    ///
    /// Routes mounted by endpoint take the endpoint's path from `endpoints`;
    /// fixed routes keep their pattern. Fails on a malformed path or if two
    /// routes would collide.
    pub fn plan_routes(&self, endpoints: &EndpointMap) -> Result<RouteTable<RouteTarget>, RouteError> {
        plan(&self.routes.load(), endpoints)
    }

    /// Rebuilds the table for `endpoints` and swaps it in. Returns the new
    /// route count; on error the current table stays.
    ///
    /// Planning and swapping happen under the write lock, so a route added
    /// concurrently is either part of the plan or waits for the swap.
    pub fn reroute(&self, endpoints: &EndpointMap) -> Result<usize, RouteError> {
        let _guard = self.write_lock.lock();
        let planned = plan(&self.routes.load(), endpoints)?;
        let routes = planned.len();
        self.routes.store(Arc::new(planned));
        Ok(routes)
    }

    /// The current route table.
    pub fn routes(&self) -> Arc<RouteTable<RouteTarget>> {
        self.routes.load_full()
    }

    /// Number of routes.
    pub fn route_count(&self) -> usize {
        self.routes.load().len()
    }

    /// Applies new server settings (timeout, retries).
    pub fn apply_server_config(&self, server: &ServerConfig) {
        self.invoker.settings.store(Arc::new(Settings::from(server)));
    }

    /// Stops invoking handlers. Matched requests get 503 from now on.
    ///
    /// Called before handlers are released at shutdown.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("dispatcher closed");
        }
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Dispatches one request.
    ///
    /// Routing runs first, so a bad body on an unknown path is still a 404.
    pub async fn dispatch(&self, mut request: DispatchRequest) -> DispatchResponse {
        let started = Instant::now();
        let method = request.method.clone();
        let path = request.path.clone();
        let table = self.routes.load_full();

        let (route, response) = match table.resolve(&method, &path) {
            Resolution::NotFound => (
                None,
                DispatchResponse::error(
                    StatusCode::NOT_FOUND,
                    "ROUTE_NOT_FOUND",
                    format!("no route for {method} {path}"),
                    None,
                ),
            ),
            Resolution::MethodNotAllowed { allowed } => (None, method_not_allowed(&method, &path, &allowed)),
            Resolution::Matched(matched) if self.is_closed() => {
                let route = matched.route.id();
                let response = shutting_down(&route);
                (Some(route), response)
            }
            Resolution::Matched(matched) if request.body_error.is_some() => {
                let route = matched.route.id();
                let response = match request.body_error.take() {
                    Some(error) => DispatchResponse::error(
                        StatusCode::BAD_REQUEST,
                        error.code(),
                        error.message(),
                        Some(&route),
                    ),
                    None => internal_error(&route),
                };
                (Some(route), response)
            }
            Resolution::Matched(matched) => {
                let route = matched.route.id();
                let target = matched.route.value();
                let mut ctx = DispatchContext::new(route.clone(), matched.params);

                let invoker = Arc::clone(&self.invoker);
                let descriptor = Arc::clone(&target.descriptor);
                let next = Next::build(
                    self.middleware.iter().chain(target.middleware.iter()),
                    move |ctx: &mut DispatchContext, request: DispatchRequest| -> BoxFuture<'static, DispatchResponse> {
                        let route = ctx.route().to_string();
                        let params = ctx.params().to_map();
                        Box::pin(async move {
                            invoker.invoke(&route, &descriptor, params, request.body).await
                        })
                    },
                );
                let response = next.run(&mut ctx, request).await;
                (Some(route), response)
            }
        };

        record(route.as_deref(), &method, &path, &response, started.elapsed());
        response
    }
}

impl ConfigListener for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn on_change(&self, snapshot: &ConfigSnapshot, change: &ConfigChange) {
        if change.server_changed {
            self.apply_server_config(&snapshot.server_config);
            tracing::info!(
                timeout_ms = snapshot.server_config.timeout_ms,
                max_retries = snapshot.server_config.max_retries,
                "dispatch settings updated"
            );
        }

        if change.endpoints.is_empty() {
            return;
        }
        match self.reroute(&snapshot.endpoints) {
            Ok(routes) => {
                tracing::info!(version = snapshot.version(), routes, "route table swapped");
            }
            Err(error) => {
                tracing::error!(version = snapshot.version(), %error, "route rebuild failed, keeping previous table");
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.route_count())
            .field("middleware", &self.middleware_names())
            .finish_non_exhaustive()
    }
}

/// Re-paths endpoint-following routes of `current` for `endpoints`.
fn plan(current: &RouteTable<RouteTarget>, endpoints: &EndpointMap) -> Result<RouteTable<RouteTarget>, RouteError> {
    let mut failure = None;

    let planned = current.rebuild(|entry| {
        let target = entry.value();
        let key = match target.descriptor.meta().endpoint.as_ref() {
            Some(key) if target.follows_endpoint => key,
            _ => return Some(entry.pattern().clone()),
        };
        match endpoints.path(key).map(PathPattern::parse) {
            Some(Ok(pattern)) => Some(pattern),
            Some(Err(e)) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                Some(entry.pattern().clone())
            }
            None => {
                tracing::warn!(route = %entry.id(), endpoint = %key, "endpoint removed, route dropped");
                None
            }
        }
    })?;

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(planned),
    }
}

fn method_not_allowed(method: &Method, path: &str, allowed: &[Method]) -> DispatchResponse {
    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    let response = DispatchResponse::error(
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        format!("{method} not allowed for {path}"),
        None,
    );
    match HeaderValue::from_str(&allow) {
        Ok(value) => response.with_header(ALLOW, value),
        Err(_) => response,
    }
}

/// One log line and one set of metrics per request.
fn record(route: Option<&str>, method: &Method, path: &str, response: &DispatchResponse, elapsed: Duration) {
    let route_label = route.unwrap_or("unmatched");
    let status = response.status.as_u16();
    let outcome = response.outcome();
    let latency_ms = elapsed.as_secs_f64() * 1000.0;

    metrics::counter!(
        "hostbridge_requests_total",
        "route" => route_label.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("hostbridge_request_duration_seconds", "route" => route_label.to_string())
        .record(elapsed.as_secs_f64());

    match response.status {
        StatusCode::INTERNAL_SERVER_ERROR => {
            tracing::error!(route = route_label, %method, path, status, latency_ms, outcome, "request failed");
        }
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            tracing::warn!(route = route_label, %method, path, status, latency_ms, outcome, "request not served");
        }
        _ => {
            tracing::info!(route = route_label, %method, path, status, latency_ms, outcome, "request");
        }
    }
}
