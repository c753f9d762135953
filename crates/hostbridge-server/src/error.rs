//! Server error types.

use hostbridge_router::RouteError;
use thiserror::Error;

/// Errors raised while mounting routes or running the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A route could not be added.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// A handler lacks the metadata needed to mount it.
    #[error("handler {handler} cannot be mounted: {reason}")]
    Unmountable {
        /// Handler id.
        handler: String,
        /// What is missing.
        reason: String,
    },

    /// Failed to bind the listener.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a duplicate-route rejection.
    pub fn is_duplicate_route(&self) -> bool {
        matches!(self, Self::Route(e) if e.is_duplicate())
    }
}
