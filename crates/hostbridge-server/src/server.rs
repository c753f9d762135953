//! HTTP/1.1 listener.
//!
//! Converts hyper requests into [`DispatchRequest`]s, hands them to the
//! [`Dispatcher`] and writes the JSON response back. Bodies must be JSON or
//! empty; an empty body reaches the handler as `null`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Request;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};

use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::response::{BodyError, DispatchRequest, HttpResponse};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Default grace period for in-flight connections after shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves a [`Dispatcher`] over HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    addr: String,
    shutdown_timeout: Duration,
}

impl HttpServer {
    /// Creates a server for `addr` (`host:port`, host may be a name).
    pub fn new(dispatcher: Arc<Dispatcher>, addr: impl Into<String>) -> Self {
        Self {
            dispatcher,
            addr: addr.into(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Sets how long to wait for open connections after shutdown.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Address the server binds to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Runs until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds and runs until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr.clone(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Runs on an already bound listener until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, routes = self.dispatcher.route_count(), "listening");

        let tracker = ConnectionTracker::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(dispatcher, stream, remote, shutdown).await {
                                tracing::debug!(%remote, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        tokio::select! {
            () = tracker.wait_for_shutdown() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(self.shutdown_timeout) => {
                tracing::warn!(
                    active = tracker.active_connections(),
                    "shutdown timeout reached with connections still open"
                );
            }
        }
        Ok(())
    }
}

async fn serve_connection(
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    remote: SocketAddr,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { Ok::<_, Infallible>(handle_request(&dispatcher, req).await) }
    });
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            // Let the in-flight request finish, then close.
            conn.as_mut().graceful_shutdown();
            tracing::debug!(%remote, "closing connection for shutdown");
            conn.await
        }
    }
}

async fn handle_request(dispatcher: &Dispatcher, req: Request<Incoming>) -> HttpResponse {
    let (parts, body) = req.into_parts();
    let mut request = DispatchRequest::new(parts.method, parts.uri.path());
    request.headers = parts.headers;

    // Body problems are reported by the dispatcher, after routing
    let request = match body.collect().await {
        Ok(collected) => match parse_body(&collected.to_bytes()) {
            Ok(body) => request.with_body(body),
            Err(e) => request.with_body_error(BodyError::InvalidJson(e.to_string())),
        },
        Err(e) => request.with_body_error(BodyError::Unreadable(e.to_string())),
    };
    dispatcher.dispatch(request).await.into_http()
}

fn parse_body(bytes: &Bytes) -> Result<Value, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
}
