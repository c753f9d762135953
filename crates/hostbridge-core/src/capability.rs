//! Capabilities a handler may require from the runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Something a handler needs from the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Calls into the host's automation API. Only legal on the host thread.
    HostApi,
    /// Reads or writes local files.
    Filesystem,
    /// Makes outbound network calls.
    Network,
    /// Needs an open document in the host.
    Document,
}

impl Capability {
    /// Every capability, in bit order.
    pub const ALL: [Self; 4] = [Self::HostApi, Self::Filesystem, Self::Network, Self::Document];

    const fn bit(self) -> u8 {
        match self {
            Self::HostApi => 1,
            Self::Filesystem => 1 << 1,
            Self::Network => 1 << 2,
            Self::Document => 1 << 3,
        }
    }

    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HostApi => "host_api",
            Self::Filesystem => "filesystem",
            Self::Network => "network",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A small set of [`Capability`] values.
///
/// # Example
///
/// ```
/// use hostbridge_core::{Capability, CapabilitySet};
///
/// let provided = CapabilitySet::from_iter([Capability::HostApi, Capability::Filesystem]);
/// let required = CapabilitySet::only(Capability::HostApi).with(Capability::Network);
///
/// let missing = required.missing_from(provided);
/// assert_eq!(missing.iter().collect::<Vec<_>>(), vec![Capability::Network]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every capability.
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1111)
    }

    /// A set holding one capability.
    #[must_use]
    pub const fn only(capability: Capability) -> Self {
        Self(capability.bit())
    }

    /// Returns this set with `capability` added.
    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Adds a capability in place.
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    /// Returns true if `capability` is in the set.
    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns the union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the members of `self` that `provided` lacks.
    #[must_use]
    pub const fn missing_from(self, provided: Self) -> Self {
        Self(self.0 & !provided.0)
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates members in bit order.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Capability>::deserialize(deserializer)?;
        Ok(list.into_iter().collect())
    }
}
