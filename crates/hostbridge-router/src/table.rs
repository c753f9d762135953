//! The route table.
//!
//! A [`RouteTable`] is built once and then only read. Updates build a new
//! table from the old one's entries and the caller swaps it in atomically.

use std::fmt;

use http::Method;

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::node::Node;
use crate::params::Params;
use crate::pattern::{split_path, PathPattern};

/// A registered `(method, pattern) → value` binding.
#[derive(Debug, Clone)]
pub struct RouteEntry<T> {
    method: Method,
    pattern: PathPattern,
    value: T,
}

impl<T> RouteEntry<T> {
    /// HTTP method of the route.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Compiled pattern of the route.
    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Payload bound to the route.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Stable identifier used in logs and error bodies, e.g. `GET /cam/setups/{id}`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{} {}", self.method, self.pattern)
    }
}

/// A matched route with its extracted parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a, T> {
    /// The matched route.
    pub route: &'a RouteEntry<T>,
    /// Parameters captured from the path, named by the route's pattern.
    pub params: Params,
}

/// Result of resolving a request against a [`RouteTable`].
#[derive(Debug, Clone)]
pub enum Resolution<'a, T> {
    /// Exactly one route matched.
    Matched(RouteMatch<'a, T>),
    /// No route matches the path under any method.
    NotFound,
    /// The path exists, but not for the requested method.
    MethodNotAllowed {
        /// Methods registered for the matching path(s).
        allowed: Vec<Method>,
    },
}

impl<'a, T> Resolution<'a, T> {
    /// Returns the match, discarding miss details.
    #[must_use]
    pub fn into_match(self) -> Option<RouteMatch<'a, T>> {
        match self {
            Self::Matched(m) => Some(m),
            _ => None,
        }
    }

    /// Returns true if a route matched.
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

/// Route table with literal-first prefix-tree matching.
///
/// # Example
///
/// ```rust
/// use hostbridge_router::{Resolution, RouteTable};
/// use http::Method;
///
/// let mut table = RouteTable::new();
/// table.insert(Method::POST, "/Box", "createBox").unwrap();
///
/// // Same method and pattern is rejected, original kept
/// assert!(table.insert(Method::POST, "/Box", "other").is_err());
/// assert_eq!(table.len(), 1);
///
/// assert!(matches!(
///     table.resolve(&Method::GET, "/Box"),
///     Resolution::MethodNotAllowed { .. }
/// ));
/// ```
///
/// # Route Priority
///
/// At each segment a literal child is tried before the parameter child, so
/// `/cam/setups/current` wins over `/cam/setups/{id}` for the path
/// `/cam/setups/current`. When the literal branch cannot complete a match the
/// lookup backtracks into the parameter branch. Because every registered
/// `(method, shape)` is unique, the walk finds at most one route.
#[derive(Clone)]
pub struct RouteTable<T> {
    root: Node,
    entries: Vec<RouteEntry<T>>,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RouteTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field(
                "routes",
                &self.entries.iter().map(RouteEntry::id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T> RouteTable<T> {
    /// Creates a new empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            entries: Vec::new(),
        }
    }

    /// Compiles `pattern` and registers it.
    pub fn insert(&mut self, method: Method, pattern: &str, value: T) -> Result<(), RouteError> {
        let pattern = PathPattern::parse(pattern)?;
        self.insert_pattern(method, pattern, value)
    }

    /// Registers an already compiled pattern.
    ///
    /// Fails with [`RouteError::Duplicate`] if the method and pattern shape
    /// are already present; the table is unchanged in that case.
    pub fn insert_pattern(
        &mut self,
        method: Method,
        pattern: PathPattern,
        value: T,
    ) -> Result<(), RouteError> {
        if !MethodRouter::<usize>::is_supported(&method) {
            return Err(RouteError::UnsupportedMethod(method));
        }

        let index = self.entries.len();
        match self.root.insert(pattern.segments(), &method, index) {
            Ok(()) => {
                self.entries.push(RouteEntry {
                    method,
                    pattern,
                    value,
                });
                Ok(())
            }
            Err(existing) => Err(RouteError::Duplicate {
                existing: self
                    .entries
                    .get(existing)
                    .map_or_else(String::new, |e| e.pattern.to_string()),
                method,
                pattern: pattern.to_string(),
            }),
        }
    }

    /// Resolves a request method and path.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_, T> {
        let segments = split_path(path);
        let lookup = self.root.lookup(&segments, method);

        match lookup.index.and_then(|i| self.entries.get(i)) {
            Some(route) => Resolution::Matched(RouteMatch {
                params: Params::from_pairs(route.pattern.param_names(), lookup.captured),
                route,
            }),
            None if lookup.allowed.is_empty() => Resolution::NotFound,
            None => Resolution::MethodNotAllowed {
                allowed: lookup.allowed,
            },
        }
    }

    /// Finds the entry registered for `method` with the same shape as `pattern`.
    #[must_use]
    pub fn find(&self, method: &Method, pattern: &PathPattern) -> Option<&RouteEntry<T>> {
        self.entries
            .iter()
            .find(|e| e.method == *method && e.pattern.same_shape(pattern))
    }

    /// Iterates entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry<T>> {
        self.entries.iter()
    }

    /// Returns the number of routes registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> RouteTable<T> {
    /// Builds a new table from this one with each entry passed through `rebind`.
    ///
    /// `rebind` may return a different pattern for an entry (or drop it by
    /// returning `None`). The first conflict aborts the rebuild and leaves
    /// `self` untouched.
    pub fn rebuild<F>(&self, mut rebind: F) -> Result<Self, RouteError>
    where
        F: FnMut(&RouteEntry<T>) -> Option<PathPattern>,
    {
        let mut table = Self::new();
        for entry in &self.entries {
            if let Some(pattern) = rebind(entry) {
                table.insert_pattern(entry.method.clone(), pattern, entry.value.clone())?;
            }
        }
        Ok(table)
    }
}
