//! Route table and path pattern matching for hostbridge.
//!
//! This crate compiles `(method, path pattern)` bindings into a prefix tree
//! and resolves inbound request paths against it. It knows nothing about
//! handlers: every route carries an arbitrary payload `T`, which the dispatch
//! layer fills with its own route target.
//!
//! # Features
//!
//! - **Compiled patterns**: `/cam/setups/{id}` is parsed once into literal and
//!   parameter segments; malformed patterns are rejected up front
//! - **Duplicate detection**: two routes with the same method and the same
//!   pattern shape can never coexist, so resolution is never ambiguous
//! - **Literal-first matching**: at every segment a literal child is tried
//!   before the parameter child, backtracking when the literal branch dead-ends
//! - **Definitive misses**: a path that exists under another method resolves to
//!   [`Resolution::MethodNotAllowed`] with the allowed methods, otherwise to
//!   [`Resolution::NotFound`]
//!
//! # Example
//!
//! ```rust
//! use hostbridge_router::{Resolution, RouteTable};
//! use http::Method;
//!
//! let mut table = RouteTable::new();
//! table.insert(Method::GET, "/cam/setups", "listSetups").unwrap();
//! table.insert(Method::GET, "/cam/setups/{id}", "getSetup").unwrap();
//!
//! match table.resolve(&Method::GET, "/cam/setups/42") {
//!     Resolution::Matched(m) => {
//!         assert_eq!(*m.route.value(), "getSetup");
//!         assert_eq!(m.params.get("id"), Some("42"));
//!     }
//!     other => panic!("unexpected resolution: {other:?}"),
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//!                    (root)
//!                      │
//!                    "cam"
//!                      │
//!                  "setups"
//!                 [GET → 0]
//!                      │
//!                    {id}
//!                 [GET → 1]
//! ```
//!
//! Tree leaves store indices into the table's entry list; the entries own the
//! compiled pattern and the payload.

mod error;
mod method_router;
mod node;
mod params;
mod pattern;
mod table;

pub use error::{PatternError, RouteError};
pub use method_router::MethodRouter;
pub use params::Params;
pub use pattern::{split_path, PathPattern, Segment};
pub use table::{Resolution, RouteEntry, RouteMatch, RouteTable};

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_basic_routing() {
        let mut table = RouteTable::new();
        table.insert(Method::GET, "/cam/setups", "listSetups").unwrap();
        table
            .insert(Method::GET, "/cam/setups/{id}", "getSetup")
            .unwrap();

        let m = table.resolve(&Method::GET, "/cam/setups").into_match().unwrap();
        assert_eq!(*m.route.value(), "listSetups");
        assert!(m.params.is_empty());

        let m = table
            .resolve(&Method::GET, "/cam/setups/42")
            .into_match()
            .unwrap();
        assert_eq!(*m.route.value(), "getSetup");
        assert_eq!(m.params.get("id"), Some("42"));
    }

    #[test]
    fn test_method_routing() {
        let mut table = RouteTable::new();
        table.insert(Method::GET, "/Box", "readBox").unwrap();
        table.insert(Method::POST, "/Box", "createBox").unwrap();

        let get = table.resolve(&Method::GET, "/Box").into_match().unwrap();
        assert_eq!(*get.route.value(), "readBox");

        let post = table.resolve(&Method::POST, "/Box").into_match().unwrap();
        assert_eq!(*post.route.value(), "createBox");

        assert!(matches!(
            table.resolve(&Method::DELETE, "/Box"),
            Resolution::MethodNotAllowed { .. }
        ));
    }

    #[test]
    fn test_no_match() {
        let mut table = RouteTable::new();
        table.insert(Method::GET, "/cam/setups", "listSetups").unwrap();

        assert!(matches!(
            table.resolve(&Method::GET, "/cam/operations"),
            Resolution::NotFound
        ));
    }

    #[test]
    fn test_multiple_params() {
        let mut table = RouteTable::new();
        table
            .insert(
                Method::GET,
                "/documents/{docId}/bodies/{bodyId}",
                "getBody",
            )
            .unwrap();

        let m = table
            .resolve(&Method::GET, "/documents/d1/bodies/b7")
            .into_match()
            .unwrap();
        assert_eq!(*m.route.value(), "getBody");
        assert_eq!(m.params.get("docId"), Some("d1"));
        assert_eq!(m.params.get("bodyId"), Some("b7"));
    }
}
