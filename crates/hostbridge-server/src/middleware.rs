//! Middleware chain.
//!
//! Middleware runs for matched routes only: global middleware first, in
//! registration order, then the route's own middleware, then the handler.
//! A middleware short-circuits by returning a response without calling
//! [`Next::run`].
//!
//! # Example
//!
//! ```
//! use hostbridge_server::{BoxFuture, DispatchContext, DispatchRequest, DispatchResponse, Middleware, Next};
//! use http::StatusCode;
//!
//! struct RequireJson;
//!
//! impl Middleware for RequireJson {
//!     fn name(&self) -> &'static str {
//!         "require-json"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut DispatchContext,
//!         request: DispatchRequest,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, DispatchResponse> {
//!         Box::pin(async move {
//!             if request.method == http::Method::POST && request.body.is_null() {
//!                 return DispatchResponse::error(
//!                     StatusCode::BAD_REQUEST,
//!                     "BODY_REQUIRED",
//!                     "a JSON body is required",
//!                     Some(ctx.route()),
//!                 );
//!             }
//!             next.run(ctx, request).await
//!         })
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hostbridge_router::Params;
use uuid::Uuid;

use crate::response::{DispatchRequest, DispatchResponse};

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-request state visible to middleware.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    request_id: Uuid,
    route: String,
    params: Params,
    started: Instant,
    attributes: HashMap<String, String>,
}

impl DispatchContext {
    /// Creates a context for a matched route.
    pub fn new(route: impl Into<String>, params: Params) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            route: route.into(),
            params,
            started: Instant::now(),
            attributes: HashMap::new(),
        }
    }

    /// Unique id of this request.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Route id, e.g. `GET /cam/setups/{id}`.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Extracted path parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Time since dispatch started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Reads a value set by an earlier middleware.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Stores a value for later middleware.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }
}

/// A stage in the dispatch chain.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request, usually by calling `next.run`.
    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        request: DispatchRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResponse>;
}

type Terminal<'a> = Box<
    dyn FnOnce(&mut DispatchContext, DispatchRequest) -> BoxFuture<'static, DispatchResponse>
        + Send
        + 'a,
>;

/// The rest of the chain.
///
/// Consumed by [`run`](Next::run), so it can be invoked at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Terminal(Terminal<'a>),
}

impl<'a> Next<'a> {
    /// Builds a chain that runs `stages` in order, then `terminal`.
    pub(crate) fn build<I, F>(stages: I, terminal: F) -> Self
    where
        I: IntoIterator<Item = &'a Arc<dyn Middleware>>,
        I::IntoIter: DoubleEndedIterator,
        F: FnOnce(&mut DispatchContext, DispatchRequest) -> BoxFuture<'static, DispatchResponse>
            + Send
            + 'a,
    {
        let mut next = Self {
            inner: NextInner::Terminal(Box::new(terminal)),
        };
        for middleware in stages.into_iter().rev() {
            next = Self {
                inner: NextInner::Chain {
                    middleware: middleware.as_ref(),
                    next: Box::new(next),
                },
            };
        }
        next
    }

    /// Invokes the next middleware, or the handler at the end of the chain.
    pub async fn run(self, ctx: &mut DispatchContext, request: DispatchRequest) -> DispatchResponse {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Terminal(terminal) => terminal(ctx, request).await,
        }
    }
}

/// A middleware built from a closure.
///
/// The closure receives the request and the rest of the chain and returns a
/// boxed future.
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut DispatchContext, DispatchRequest, Next<'a>) -> BoxFuture<'a, DispatchResponse>
        + Send
        + Sync
        + 'static,
{
    /// Creates a function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut DispatchContext, DispatchRequest, Next<'a>) -> BoxFuture<'a, DispatchResponse>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        request: DispatchRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResponse> {
        (self.func)(ctx, request, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use serde_json::json;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut DispatchContext,
            request: DispatchRequest,
            next: Next<'a>,
        ) -> BoxFuture<'a, DispatchResponse> {
            Box::pin(async move {
                let trail = ctx.attribute("trail").unwrap_or_default().to_string();
                ctx.set_attribute("trail", format!("{trail}{}>", self.0));
                next.run(ctx, request).await
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut DispatchContext,
            _request: DispatchRequest,
            _next: Next<'a>,
        ) -> BoxFuture<'a, DispatchResponse> {
            Box::pin(async move {
                DispatchResponse::error(StatusCode::FORBIDDEN, "DENIED", "denied", Some(ctx.route()))
            })
        }
    }

    fn echo_trail(ctx: &mut DispatchContext, _request: DispatchRequest) -> BoxFuture<'static, DispatchResponse> {
        let trail = ctx.attribute("trail").unwrap_or_default().to_string();
        Box::pin(async move { DispatchResponse::ok(json!(trail)) })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let stages: Vec<Arc<dyn Middleware>> = vec![Arc::new(Tag("a")), Arc::new(Tag("b"))];
        let mut ctx = DispatchContext::new("GET /x", Params::new());
        let request = DispatchRequest::new(Method::GET, "/x");

        let response = Next::build(stages.iter(), echo_trail).run(&mut ctx, request).await;
        assert_eq!(response.body, json!("a>b>"));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let stages: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(Tag("a")), Arc::new(Deny), Arc::new(Tag("never"))];
        let mut ctx = DispatchContext::new("GET /x", Params::new());
        let request = DispatchRequest::new(Method::GET, "/x");

        let response = Next::build(stages.iter(), echo_trail).run(&mut ctx, request).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(ctx.attribute("trail"), Some("a>"));
    }

    #[tokio::test]
    async fn test_fn_middleware() {
        let header_check = FnMiddleware::new("fn", |ctx, request, next| {
            Box::pin(async move {
                ctx.set_attribute("trail", "fn>");
                next.run(ctx, request).await
            })
        });
        let stages: Vec<Arc<dyn Middleware>> = vec![Arc::new(header_check)];
        let mut ctx = DispatchContext::new("GET /x", Params::new());

        let response = Next::build(stages.iter(), echo_trail)
            .run(&mut ctx, DispatchRequest::new(Method::GET, "/x"))
            .await;
        assert_eq!(response.body, json!("fn>"));
    }
}
