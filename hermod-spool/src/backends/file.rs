use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use hermod_common::{ItemId, Message, internal};
use tokio::{fs, io::AsyncWriteExt};

use crate::{BackingStore, SpoolError, ValidationError};

/// Prefix for records that are still being written
pub const TEMP_PREFIX: &str = ".tmp_";

const SENSITIVE_PREFIXES: [&str; 9] = [
    "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
];

/// File-based backing store
///
/// Each record lives in `{id}.bin` inside the spool directory and holds the
/// bincode encoding of the full [`Message`]: envelope, payload and every
/// recipient's status.
///
/// # Atomicity
/// Writes go to `.tmp_{id}.bin`, are synced, and are then renamed over the
/// real record. A crash mid-write leaves only a temp file behind, which
/// [`list`](BackingStore::list) never reports and [`init`](Self::init)
/// removes.
///
/// # Security
/// Only filenames accepted by [`ItemId::from_filename`] are ever listed, so
/// stray or hostile files in the directory are ignored.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/hermod"),
        }
    }
}

impl FileBackingStore {
    /// Reject spool paths that are relative, traverse upwards, or point into
    /// a system directory
    ///
    /// # Errors
    /// A [`ValidationError`] describing the first problem found
    pub fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentDir(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        match SENSITIVE_PREFIXES
            .into_iter()
            .find(|prefix| path.starts_with(prefix))
        {
            Some(prefix) => Err(ValidationError::SystemDirectory {
                prefix,
                path: path.display().to_string(),
            }),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_path(&self, id: &ItemId) -> PathBuf {
        self.path.join(id.filename())
    }

    fn temp_path(&self, id: &ItemId) -> PathBuf {
        self.path.join(format!("{TEMP_PREFIX}{}", id.filename()))
    }

    /// Prepare the spool directory
    ///
    /// Creates the directory if needed and removes temp files left by writes
    /// that never completed.
    ///
    /// # Errors
    /// - If the directory cannot be created or read
    /// - If the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising spool at {} ...", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        let mut cleaned = 0;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} incomplete record(s) from spool"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    #[tracing::instrument(level = "debug", skip(self, message), fields(id = %message.id))]
    async fn write(&self, message: &Message) -> crate::Result<()> {
        let record = crate::encode(message)?;
        let temp_path = self.temp_path(&message.id);

        let staged = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&record).await?;
            file.sync_all().await?;
            drop(file);

            fs::rename(&temp_path, self.record_path(&message.id)).await
        }
        .await;

        if let Err(err) = staged {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        // Make the rename itself durable
        fs::File::open(&self.path).await?.sync_all().await?;

        internal!(level = DEBUG, "Wrote record {} ({} bytes)", message.id, record.len());

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list(&self) -> crate::Result<Vec<ItemId>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if filename.starts_with(TEMP_PREFIX) {
                continue;
            }

            if let Some(id) = ItemId::from_filename(&filename) {
                ids.push(id);
            }
        }

        // ULIDs sort by creation time
        ids.sort();

        internal!(level = DEBUG, "Found {} record(s) in spool", ids.len());

        Ok(ids)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn read(&self, id: &ItemId) -> crate::Result<Message> {
        let bytes = match fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(id.clone()));
            }
            Err(err) => return Err(err.into()),
        };

        let message = crate::decode(&bytes)?;
        if &message.id != id {
            return Err(crate::SerializationError::Corrupted(format!(
                "record {id} holds message {}",
                message.id
            ))
            .into());
        }

        Ok(message)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn delete(&self, id: &ItemId) -> crate::Result<()> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => {
                internal!(level = DEBUG, "Deleted record {id}");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(SpoolError::NotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct FileBackingStoreBuilder {
    path: PathBuf,
}

impl FileBackingStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the store after validating its path
    ///
    /// # Errors
    /// If the path is relative, traverses upwards or is a system directory
    pub fn build(self) -> Result<FileBackingStore, ValidationError> {
        FileBackingStore::validate_path(&self.path)?;
        Ok(FileBackingStore { path: self.path })
    }
}
