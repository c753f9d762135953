//! # Hostbridge Server
//!
//! Request dispatch and the HTTP/1.1 adapter.
//!
//! - [`Dispatcher`] resolves `(method, path)` against an atomically swapped
//!   route table, runs middleware and invokes handlers, sending host-thread
//!   handlers through the task queue
//! - [`HttpServer`] accepts connections with hyper and feeds the dispatcher
//! - [`ShutdownSignal`] and [`ConnectionTracker`] coordinate graceful stop
//!
//! Every request yields exactly one [`DispatchResponse`]. Errors use the
//! envelope `{"error": {"code", "message", "route"}}`:
//!
//! | Status | Code | When |
//! |--------|------|------|
//! | 404 | `ROUTE_NOT_FOUND` | no pattern matches the path |
//! | 405 | `METHOD_NOT_ALLOWED` | path matches, method does not (`Allow` set) |
//! | 503 | `QUEUE_FULL` | host queue full after retries (`Retry-After` set) |
//! | 503 | `SHUTTING_DOWN` | queue closed |
//! | 504 | `TIMEOUT` | host did not complete in time |
//! | 500 | `INTERNAL_ERROR` | handler panicked |

#![doc(html_root_url = "https://docs.rs/hostbridge-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatcher;
mod error;
mod middleware;
mod response;
mod server;
pub mod shutdown;

pub use dispatcher::{Dispatcher, RouteTarget};
pub use error::ServerError;
pub use middleware::{BoxFuture, DispatchContext, FnMiddleware, Middleware, Next};
pub use response::{BodyError, DispatchRequest, DispatchResponse, HttpResponse};
pub use server::{HttpServer, DEFAULT_SHUTDOWN_TIMEOUT};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dispatcher::Dispatcher;
    pub use crate::middleware::{BoxFuture, DispatchContext, Middleware, Next};
    pub use crate::response::{DispatchRequest, DispatchResponse};
    pub use crate::server::HttpServer;
    pub use crate::shutdown::ShutdownSignal;
}
