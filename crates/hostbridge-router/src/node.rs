//! Prefix tree node implementation.
//!
//! Each node represents one path segment. Literal children are kept sorted
//! for binary search; a node has at most one parameter child, shared by every
//! pattern that places a parameter at that depth. Parameter names are not
//! stored in the tree: captured values are collected positionally and named
//! by the matched route's own pattern.

use http::Method;

use crate::method_router::MethodRouter;
use crate::pattern::Segment;

/// A node in the route tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    /// Literal segment this node was reached by (empty for the root and param nodes)
    segment: String,

    /// Route entry indices for this node, per method
    methods: MethodRouter<usize>,

    /// Literal children, sorted by segment for binary search
    literal_children: Vec<Node>,

    /// Parameter child (at most one per node)
    param_child: Option<Box<Node>>,
}

/// Outcome of walking the tree for one request path.
#[derive(Debug, Default)]
pub(crate) struct Lookup<'p> {
    /// Entry index of the matched route
    pub index: Option<usize>,
    /// Values captured by parameter slots, in path order
    pub captured: Vec<&'p str>,
    /// Methods available at every node whose path matched
    pub allowed: Vec<Method>,
}

impl Node {
    fn new_literal(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            ..Self::default()
        }
    }

    /// Inserts a route entry index.
    ///
    /// Returns the index already registered for the same method and shape.
    pub(crate) fn insert(
        &mut self,
        segments: &[Segment],
        method: &Method,
        index: usize,
    ) -> Result<(), usize> {
        let Some((first, rest)) = segments.split_first() else {
            return match self.methods.try_insert(method, index) {
                Ok(()) => Ok(()),
                Err(_) => Err(self.methods.lookup(method).copied().unwrap_or(index)),
            };
        };

        match first {
            Segment::Literal(lit) => {
                let pos = match self
                    .literal_children
                    .binary_search_by(|c| c.segment.as_str().cmp(lit))
                {
                    Ok(pos) => pos,
                    Err(pos) => {
                        // Keep sorted for binary search
                        self.literal_children.insert(pos, Node::new_literal(lit));
                        pos
                    }
                };
                self.literal_children[pos].insert(rest, method, index)
            }
            Segment::Param(_) => self
                .param_child
                .get_or_insert_with(Box::default)
                .insert(rest, method, index),
        }
    }

    /// Walks the tree for a request path.
    pub(crate) fn lookup<'p>(&self, segments: &[&'p str], method: &Method) -> Lookup<'p> {
        let mut lookup = Lookup::default();
        lookup.index = self.find(segments, method, &mut lookup.captured, &mut lookup.allowed);
        if lookup.index.is_none() {
            lookup.captured.clear();
        }
        lookup
    }

    fn find<'p>(
        &self,
        segments: &[&'p str],
        method: &Method,
        captured: &mut Vec<&'p str>,
        allowed: &mut Vec<Method>,
    ) -> Option<usize> {
        let Some((first, rest)) = segments.split_first() else {
            if let Some(index) = self.methods.lookup(method) {
                return Some(*index);
            }
            for m in self.methods.allowed_methods() {
                if !allowed.contains(&m) {
                    allowed.push(m);
                }
            }
            return None;
        };

        // Literal match first (highest priority)
        if let Ok(pos) = self
            .literal_children
            .binary_search_by(|c| c.segment.as_str().cmp(first))
        {
            if let Some(index) = self.literal_children[pos].find(rest, method, captured, allowed) {
                return Some(index);
            }
        }

        // Parameter fallback
        if let Some(child) = &self.param_child {
            captured.push(first);
            if let Some(index) = child.find(rest, method, captured, allowed) {
                return Some(index);
            }
            // Backtrack
            captured.pop();
        }

        None
    }
}
