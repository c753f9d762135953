//! Error types for handlers, discovery and validation.
//!
//! [`HandlerError`] is what a handler returns. Its kind decides the HTTP
//! status the caller sees. [`DiscoveryError`] and [`ValidationError`] are
//! raised while the registry is being built.

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Capability, CapabilitySet, Category, EndpointKey};

/// Result type alias using [`HandlerError`].
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Classification of a [`HandlerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerErrorKind {
    /// The request was malformed.
    BadRequest,
    /// The addressed entity does not exist in the host.
    NotFound,
    /// The host is in a state that conflicts with the request.
    Conflict,
    /// The host cannot serve the request right now.
    Unavailable,
    /// Anything else.
    Internal,
}

impl HandlerErrorKind {
    /// Returns the default HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Typed error raised by a handler.
///
/// # Example
///
/// ```
/// use hostbridge_core::{HandlerError, HandlerErrorKind};
///
/// fn check_units(units: &str) -> Result<(), HandlerError> {
///     if units != "mm" && units != "in" {
///         return Err(HandlerError::bad_request(format!("unsupported units: {units}")));
///     }
///     Ok(())
/// }
///
/// let err = check_units("parsec").unwrap_err();
/// assert_eq!(err.kind(), HandlerErrorKind::BadRequest);
/// assert_eq!(err.status_code().as_u16(), 400);
/// ```
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The request was malformed.
    #[error("bad request: {message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
    },

    /// The addressed entity does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// The request conflicts with host state.
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// The host cannot serve the request right now.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Human-readable error message.
        message: String,
    },

    /// Internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl HandlerError {
    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> HandlerErrorKind {
        match self {
            Self::BadRequest { .. } => HandlerErrorKind::BadRequest,
            Self::NotFound { .. } => HandlerErrorKind::NotFound,
            Self::Conflict { .. } => HandlerErrorKind::Conflict,
            Self::Unavailable { .. } => HandlerErrorKind::Unavailable,
            Self::Internal { .. } => HandlerErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Returns the message safe to show to clients.
    ///
    /// Internal errors are reduced to their message; the source chain is
    /// only logged.
    #[must_use]
    pub fn public_message(&self) -> &str {
        match self {
            Self::BadRequest { message }
            | Self::NotFound { message }
            | Self::Conflict { message }
            | Self::Unavailable { message }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::bad_request(format!("invalid body: {e}"))
    }
}

/// A handler module failed to load.
///
/// Discovery logs it, leaves the module out and carries on with the rest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("module {module} failed to load: {reason}")]
pub struct DiscoveryError {
    /// Module name.
    pub module: String,
    /// What went wrong.
    pub reason: String,
}

impl DiscoveryError {
    /// Creates a discovery error.
    pub fn new(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

/// A handler descriptor is unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A handler with this category and name is already registered.
    #[error("duplicate handler {category}/{name}")]
    DuplicateHandler {
        /// Category of both handlers.
        category: Category,
        /// Shared name.
        name: String,
    },

    /// The descriptor declares no HTTP method.
    #[error("handler {handler} declares no HTTP method")]
    MissingMethod {
        /// Handler id.
        handler: String,
    },

    /// The descriptor declares a method that cannot be routed.
    #[error("handler {handler} declares unsupported method {method}")]
    UnsupportedMethod {
        /// Handler id.
        handler: String,
        /// Offending method.
        method: Method,
    },

    /// The descriptor declares no endpoint.
    #[error("handler {handler} declares no endpoint")]
    MissingEndpoint {
        /// Handler id.
        handler: String,
    },

    /// The endpoint has no path in the configuration.
    #[error("handler {handler} is bound to {endpoint}, which has no configured path")]
    UnknownEndpoint {
        /// Handler id.
        handler: String,
        /// Endpoint the handler names.
        endpoint: EndpointKey,
    },

    /// The endpoint lives in another category than the handler.
    #[error("handler {handler} is in category {category} but bound to {endpoint}")]
    CategoryMismatch {
        /// Handler id.
        handler: String,
        /// Handler category.
        category: Category,
        /// Endpoint the handler names.
        endpoint: EndpointKey,
    },

    /// The runtime cannot provide capabilities the handler requires.
    #[error("handler {handler} requires unavailable capabilities {missing}")]
    MissingCapabilities {
        /// Handler id.
        handler: String,
        /// Capabilities the runtime lacks.
        missing: CapabilitySet,
    },
}

impl ValidationError {
    /// Returns true if the runtime lacks `capability` for this handler.
    #[must_use]
    pub fn lacks(&self, capability: Capability) -> bool {
        matches!(self, Self::MissingCapabilities { missing, .. } if missing.contains(capability))
    }
}
