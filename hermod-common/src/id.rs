use std::fmt::{self, Display};

use serde::{Deserialize, Deserializer, Serialize};

/// Extension used for persisted queue records
pub const RECORD_EXTENSION: &str = "bin";

/// Identifier of a queued message
///
/// Opaque to everything but the id generator, which hands out ULIDs. The
/// only promises made here are the ones the spool relies on: at least six
/// characters, ASCII alphanumeric, so it is always safe as a filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub const MIN_LEN: usize = 6;
    pub const MAX_LEN: usize = 64;

    /// Validate and wrap an identifier
    pub fn parse(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let valid = (Self::MIN_LEN..=Self::MAX_LEN).contains(&id.len())
            && id.bytes().all(|b| b.is_ascii_alphanumeric());

        valid.then_some(Self(id))
    }

    /// Parse a record filename like `01ARZ3NDEKTSV4RRFFQ69G5FAV.bin`
    ///
    /// # Security
    /// Anything with a path separator, a traversal pattern, a different
    /// extension or an invalid id is rejected.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(RECORD_EXTENSION)?.strip_suffix('.')?;

        Self::parse(stem)
    }

    /// Filename the record for this id is stored under
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}.{RECORD_EXTENSION}", self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ulid::Ulid> for ItemId {
    fn from(ulid: ulid::Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(s.clone())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid item id {s:?}")))
    }
}
