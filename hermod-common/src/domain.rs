//! Domain newtype and the set of domains we are authoritative for
//!
//! Wraps domain strings to prevent accidentally passing email addresses
//! or other strings where domains are expected.

use std::{
    collections::HashSet,
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Deserializer, Serialize};

/// A domain name string wrapper for type safety
///
/// Domains are compared case-insensitively by storing them lowercased.
///
/// # Examples
///
/// ```
/// use hermod_common::Domain;
///
/// let domain = Domain::new("Example.COM");
/// assert_eq!(domain.as_str(), "example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    /// Create a new `Domain`, folding it to lowercase
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Arc::from(s.as_ref().trim().to_ascii_lowercase()))
    }

    /// Get the domain as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the domain into the inner `Arc<str>`
    #[must_use]
    pub fn into_inner(self) -> Arc<str> {
        self.0
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Read-only set of local domains
///
/// Membership answers "are we the final destination for this domain".
/// The set is fixed once built; queues take a copy at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainSet {
    domains: HashSet<Domain>,
}

impl DomainSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `domain` is one of ours
    #[must_use]
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(&Domain::new(domain))
    }

    pub fn insert(&mut self, domain: impl Into<Domain>) -> bool {
        self.domains.insert(domain.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Domain> {
        self.domains.iter()
    }
}

impl<D: Into<Domain>> FromIterator<D> for DomainSet {
    fn from_iter<I: IntoIterator<Item = D>>(iter: I) -> Self {
        Self {
            domains: iter.into_iter().map(Into::into).collect(),
        }
    }
}
