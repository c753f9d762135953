//! Path parameters captured by a route match.

use std::collections::HashMap;

use smallvec::SmallVec;

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// Named values captured from a request path.
///
/// Parameters keep the order in which they appear in the pattern.
///
/// # Example
///
/// ```rust
/// use hostbridge_router::Params;
///
/// let params = Params::from_pairs(["docId", "bodyId"], ["d1", "b7"]);
/// assert_eq!(params.get("docId"), Some("d1"));
/// assert_eq!(params.get("bodyId"), Some("b7"));
/// assert_eq!(params.get("unknown"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates a new empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zips parameter names with captured values.
    ///
    /// Extra names or values are ignored.
    pub fn from_pairs<N, V>(
        names: impl IntoIterator<Item = N>,
        values: impl IntoIterator<Item = V>,
    ) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            inner: names
                .into_iter()
                .zip(values)
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }

    /// Adds a parameter to the set.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the value for a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Copies the parameters into an owned map for handler consumption.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.inner.iter().cloned().collect()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_new() {
        let params = Params::new();
        assert!(params.is_empty());
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn test_from_pairs_truncates_to_shortest() {
        let params = Params::from_pairs(["a", "b", "c"], ["1", "2"]);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("c"), None);
    }

    #[test]
    fn test_iter_preserves_order() {
        let mut params = Params::new();
        params.push("doc", "d1");
        params.push("body", "b2");

        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("doc", "d1"), ("body", "b2")]);
    }

    #[test]
    fn test_to_map() {
        let params = Params::from_pairs(["id"], ["42"]);
        let map = params.to_map();
        assert_eq!(map.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_spills_past_inline_capacity() {
        let params: Params = (0..10)
            .map(|i| (format!("key{i}"), format!("value{i}")))
            .collect();
        assert_eq!(params.len(), 10);
        assert_eq!(params.get("key7"), Some("value7"));
    }
}
