//! Path pattern compilation.
//!
//! A pattern is a `/`-separated list of segments. Each segment is either a
//! literal (`setups`) or a named parameter slot (`{id}`). Empty segments are
//! dropped, so `/cam/setups/` and `/cam/setups` compile to the same pattern.

use std::fmt;
use std::str::FromStr;

use crate::error::PatternError;

/// A single compiled segment of a [`PathPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Literal segment that must match exactly (e.g. `setups`).
    Literal(String),
    /// Named parameter slot that matches any single segment (e.g. `{id}`).
    Param(String),
}

impl Segment {
    /// Returns true for literal segments.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(s),
            Self::Param(name) => write!(f, "{{{name}}}"),
        }
    }
}

/// A compiled path pattern.
///
/// # Example
///
/// ```rust
/// use hostbridge_router::{PathPattern, Segment};
///
/// let pattern = PathPattern::parse("/cam/setups/{id}/").unwrap();
/// assert_eq!(pattern.as_str(), "/cam/setups/{id}");
/// assert_eq!(pattern.literal_count(), 2);
/// assert_eq!(pattern.segments()[2], Segment::Param("id".to_string()));
///
/// assert!(PathPattern::parse("cam/setups").is_err());
/// assert!(PathPattern::parse("/cam/{}").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    normalized: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a pattern string.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        let mut segments = Vec::new();
        for raw in pattern.split('/').filter(|s| !s.is_empty()) {
            let segment = if let Some(inner) = raw.strip_prefix('{') {
                let name = inner.strip_suffix('}').ok_or_else(|| {
                    PatternError::MalformedSegment {
                        pattern: pattern.to_string(),
                        segment: raw.to_string(),
                    }
                })?;
                if name.is_empty() {
                    return Err(PatternError::EmptyParam(pattern.to_string()));
                }
                if !is_identifier(name) {
                    return Err(PatternError::InvalidParamName {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                if segments
                    .iter()
                    .any(|s| matches!(s, Segment::Param(existing) if existing == name))
                {
                    return Err(PatternError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                Segment::Param(name.to_string())
            } else if raw.chars().all(is_literal_char) {
                Segment::Literal(raw.to_string())
            } else {
                return Err(PatternError::MalformedSegment {
                    pattern: pattern.to_string(),
                    segment: raw.to_string(),
                });
            };
            segments.push(segment);
        }

        let normalized = Self::render(&segments);
        Ok(Self {
            normalized,
            segments,
        })
    }

    fn render(segments: &[Segment]) -> String {
        if segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in segments {
            out.push('/');
            out.push_str(&segment.to_string());
        }
        out
    }

    /// Returns the normalized pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Returns the compiled segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns parameter names in the order they appear.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Returns the number of literal segments.
    #[must_use]
    pub fn literal_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_literal()).count()
    }

    /// Returns true if two patterns match exactly the same set of paths.
    ///
    /// Parameter names are ignored: `/a/{x}` and `/a/{y}` have the same shape.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| match (a, b) {
                    (Segment::Literal(x), Segment::Literal(y)) => x == y,
                    (Segment::Param(_), Segment::Param(_)) => true,
                    _ => false,
                })
    }

    /// Checks a request path against this pattern in isolation.
    ///
    /// Table lookups go through the tree instead; this is used for validation
    /// and diagnostics.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let parts = split_path(path);
        parts.len() == self.segments.len()
            && self.segments.iter().zip(parts).all(|(s, p)| match s {
                Segment::Literal(lit) => lit == p,
                Segment::Param(_) => true,
            })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Splits a request path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}
