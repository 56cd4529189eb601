use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

use crate::{BackingStore, FileBackingStore, MemoryBackingStore};

/// Which backing store the queue persists to
///
/// File-backed spool in RON config:
/// ```ron
/// Hermod (
///     spool: File(
///         path: "/var/spool/hermod",
///     ),
/// )
/// ```
///
/// Memory-backed spool (nothing survives a restart):
/// ```ron
/// Hermod (
///     spool: Memory,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum SpoolConfig {
    File { path: PathBuf },
    Memory,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::File {
            path: FileBackingStore::default().path().to_path_buf(),
        }
    }
}

impl SpoolConfig {
    /// Directory of a file-backed spool
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }

    /// Validate and initialise the configured store, handing it out as a
    /// trait object
    ///
    /// # Errors
    /// If the spool path is unsafe or its directory cannot be prepared
    pub fn into_backing_store(self) -> crate::Result<Arc<dyn BackingStore>> {
        match self {
            Self::File { path } => {
                let store = FileBackingStore::builder().path(path).build()?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory => Ok(Arc::new(MemoryBackingStore::new())),
        }
    }

    /// Open the configured store for inspection only
    ///
    /// Unlike [`into_backing_store`](Self::into_backing_store) nothing is
    /// created or cleaned up, so it is safe against a spool a running
    /// queue is writing to.
    ///
    /// # Errors
    /// If the spool path is unsafe
    pub fn open_read_only(self) -> crate::Result<Arc<dyn BackingStore>> {
        match self {
            Self::File { path } => Ok(Arc::new(FileBackingStore::builder().path(path).build()?)),
            Self::Memory => Ok(Arc::new(MemoryBackingStore::new())),
        }
    }
}
