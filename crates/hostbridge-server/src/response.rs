//! Transport-neutral request and response types.
//!
//! The dispatcher works on [`DispatchRequest`] / [`DispatchResponse`]; the
//! HTTP adapter converts to and from hyper types at the edge.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Response, StatusCode};
use http_body_util::Full;
use serde_json::{json, Value};

/// Type alias for the HTTP response produced by [`DispatchResponse::into_http`].
pub type HttpResponse = Response<Full<Bytes>>;

/// An inbound request, already parsed.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path, without query string.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// JSON body (`Null` if absent).
    pub body: Value,
    /// Set when the transport could not produce a JSON body. The request
    /// is still routed; a matched route answers 400.
    pub body_error: Option<BodyError>,
}

/// Why a request body was unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// The body could not be read off the connection.
    Unreadable(String),
    /// The body is not valid JSON.
    InvalidJson(String),
}

impl BodyError {
    /// Error code for the response body.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unreadable(_) => "BODY_READ_ERROR",
            Self::InvalidJson(_) => "INVALID_JSON",
        }
    }

    /// Client-facing message.
    pub fn message(&self) -> String {
        match self {
            Self::Unreadable(reason) => format!("failed to read request body: {reason}"),
            Self::InvalidJson(reason) => format!("request body is not valid JSON: {reason}"),
        }
    }
}

impl DispatchRequest {
    /// Creates a request with no headers and a `Null` body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Value::Null,
            body_error: None,
        }
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Marks the body as unusable.
    #[must_use]
    pub fn with_body_error(mut self, error: BodyError) -> Self {
        self.body = Value::Null;
        self.body_error = Some(error);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// The single terminal response for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    /// Status code.
    pub status: StatusCode,
    /// Extra headers (`Allow`, `Retry-After`, ...).
    pub headers: HeaderMap,
    /// JSON body.
    pub body: Value,
}

impl DispatchResponse {
    /// 200 with `body`.
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// An error response in the standard envelope:
    /// `{"error": {"code", "message", "route"}}`.
    pub fn error(
        status: StatusCode,
        code: &str,
        message: impl Into<String>,
        route: Option<&str>,
    ) -> Self {
        let mut error = json!({
            "code": code,
            "message": message.into(),
        });
        if let Some(route) = route {
            error["route"] = Value::from(route);
        }

        Self {
            status,
            headers: HeaderMap::new(),
            body: json!({ "error": error }),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// The `error.code` field, if this is an error response.
    pub fn error_code(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
    }

    /// Coarse classification used in logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self.status {
            s if s.is_success() => "ok",
            StatusCode::NOT_FOUND if self.error_code() == Some("ROUTE_NOT_FOUND") => "no_route",
            StatusCode::METHOD_NOT_ALLOWED => "method_not_allowed",
            StatusCode::GATEWAY_TIMEOUT => "timeout",
            StatusCode::SERVICE_UNAVAILABLE => "unavailable",
            s if s.is_client_error() => "rejected",
            _ => "fault",
        }
    }

    /// Converts to an HTTP response with a JSON body.
    pub fn into_http(self) -> HttpResponse {
        let body = serde_json::to_vec(&self.body).unwrap_or_else(|_| b"null".to_vec());
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(self.headers);
        response
    }
}
