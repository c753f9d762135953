//! Error types for pattern compilation and route registration.

use http::Method;
use thiserror::Error;

/// Errors raised while compiling a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern does not start with `/`.
    #[error("path pattern must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    /// A `{}` segment with no name.
    #[error("empty parameter name in pattern {0:?}")]
    EmptyParam(String),

    /// A segment containing characters outside the allowed set, or stray braces.
    #[error("malformed segment {segment:?} in pattern {pattern:?}")]
    MalformedSegment {
        /// Full pattern.
        pattern: String,
        /// Offending segment.
        segment: String,
    },

    /// A parameter name that is not an identifier.
    #[error("invalid parameter name {name:?} in pattern {pattern:?}")]
    InvalidParamName {
        /// Full pattern.
        pattern: String,
        /// Offending name.
        name: String,
    },

    /// The same parameter name used twice in one pattern.
    #[error("duplicate parameter {name:?} in pattern {pattern:?}")]
    DuplicateParam {
        /// Full pattern.
        pattern: String,
        /// Repeated name.
        name: String,
    },
}

/// Errors raised while registering a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A route with the same method and pattern shape already exists.
    ///
    /// The existing route is left untouched.
    #[error("duplicate route {method} {pattern} (conflicts with {existing})")]
    Duplicate {
        /// Method of the rejected route.
        method: Method,
        /// Pattern of the rejected route.
        pattern: String,
        /// Pattern of the route already registered.
        existing: String,
    },

    /// The pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// Only GET, POST, PUT and DELETE can be routed.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(Method),
}

impl RouteError {
    /// Returns true if this is a duplicate-route rejection.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}
