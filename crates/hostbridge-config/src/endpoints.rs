//! The endpoint map: category → group → name → path.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use hostbridge_router::PathPattern;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Handler category.
///
/// Categories are a closed set. Configuration naming any other category is
/// rejected when it is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Geometry and modelling operations.
    Design,
    /// CAM setups, toolpaths and tooling.
    Manufacture,
    /// Experimental operations.
    Research,
    /// Bridge introspection and housekeeping.
    System,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Self; 4] = [Self::Design, Self::Manufacture, Self::Research, Self::System];

    /// Returns the lowercase name used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Manufacture => "manufacture",
            Self::Research => "research",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

/// Fully qualified endpoint name, e.g. `design.geometry.box`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    /// Category the endpoint belongs to.
    pub category: Category,
    /// Group within the category.
    pub group: String,
    /// Name within the group.
    pub name: String,
}

impl EndpointKey {
    /// Creates a key.
    pub fn new(category: Category, group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category,
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.category, self.group, self.name)
    }
}

impl FromStr for EndpointKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(category), Some(group), Some(name)) if !group.is_empty() && !name.is_empty() => {
                Ok(Self::new(category.parse()?, group, name))
            }
            _ => Err(ConfigError::invalid_value(
                "endpoint",
                format!("expected category.group.name, got {s:?}"),
            )),
        }
    }
}

/// Endpoint paths keyed by category, group and name.
///
/// Iteration follows file order so routes are registered in the order the
/// configuration lists them.
///
/// # Example
///
/// ```
/// use hostbridge_config::{Category, EndpointKey, EndpointMap};
///
/// let endpoints = EndpointMap::new()
///     .with(EndpointKey::new(Category::Design, "geometry", "box"), "/Box")
///     .with(EndpointKey::new(Category::Manufacture, "cam", "setups"), "/cam/setups");
///
/// let key = EndpointKey::new(Category::Design, "geometry", "box");
/// assert_eq!(endpoints.path(&key), Some("/Box"));
/// assert!(endpoints.problems().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointMap {
    inner: IndexMap<Category, IndexMap<String, IndexMap<String, String>>>,
}

impl EndpointMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: EndpointKey, path: impl Into<String>) -> Self {
        self.insert(key, path);
        self
    }

    /// Inserts or replaces a path, returning the previous one.
    pub fn insert(&mut self, key: EndpointKey, path: impl Into<String>) -> Option<String> {
        self.inner
            .entry(key.category)
            .or_default()
            .entry(key.group)
            .or_default()
            .insert(key.name, path.into())
    }

    /// Returns the path configured for `key`.
    #[must_use]
    pub fn path(&self, key: &EndpointKey) -> Option<&str> {
        self.inner
            .get(&key.category)?
            .get(&key.group)?
            .get(&key.name)
            .map(String::as_str)
    }

    /// Returns true if `key` has a path.
    #[must_use]
    pub fn contains(&self, key: &EndpointKey) -> bool {
        self.path(key).is_some()
    }

    /// Replaces the path of an existing endpoint, returning the old path.
    ///
    /// Unlike [`insert`](Self::insert) this never creates an endpoint.
    pub fn set_path(&mut self, key: &EndpointKey, path: impl Into<String>) -> Result<String, ConfigError> {
        let slot = self
            .inner
            .get_mut(&key.category)
            .and_then(|groups| groups.get_mut(&key.group))
            .and_then(|names| names.get_mut(&key.name))
            .ok_or_else(|| ConfigError::UnknownEndpoint(key.to_string()))?;
        Ok(std::mem::replace(slot, path.into()))
    }

    /// Iterates `(key, path)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (EndpointKey, &str)> {
        self.inner.iter().flat_map(|(category, groups)| {
            groups.iter().flat_map(move |(group, names)| {
                names
                    .iter()
                    .map(move |(name, path)| (EndpointKey::new(*category, group, name), path.as_str()))
            })
        })
    }

    /// Returns the number of endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .values()
            .flat_map(IndexMap::values)
            .map(IndexMap::len)
            .sum()
    }

    /// Returns true if the map has no endpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the endpoint whose path normalizes to the same pattern as `path`.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<EndpointKey> {
        let wanted = PathPattern::parse(path).ok()?;
        self.iter()
            .find(|(_, p)| PathPattern::parse(p).is_ok_and(|p| p == wanted))
            .map(|(key, _)| key)
    }

    /// Checks every path, returning one message per failed check.
    ///
    /// A path fails if it is not a well-formed pattern or if another endpoint
    /// anywhere in the map already uses the same normalized path.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen: HashMap<String, EndpointKey> = HashMap::new();

        for (key, path) in self.iter() {
            match PathPattern::parse(path) {
                Ok(pattern) => {
                    if let Some(first) = seen.get(pattern.as_str()) {
                        problems.push(format!(
                            "endpoint {key}: path {} is already used by {first}",
                            pattern.as_str()
                        ));
                    } else {
                        seen.insert(pattern.as_str().to_string(), key);
                    }
                }
                Err(e) => problems.push(format!("endpoint {key}: {e}")),
            }
        }

        problems
    }
}
