use async_trait::async_trait;
use hermod_common::{ItemId, Message};

/// Storage backend for queue records
///
/// Implementations must be safe to share between the queue and every
/// delivery task. The queue serializes writes for any single id, so a
/// backend only needs each individual call to be atomic.
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Create or replace the record for `message.id`
    ///
    /// On success the record is durable. On failure any previous record for
    /// the same id is left intact.
    async fn write(&self, message: &Message) -> crate::Result<()>;

    /// Ids of every stored record, oldest first
    async fn list(&self) -> crate::Result<Vec<ItemId>>;

    /// Read a record back
    ///
    /// # Errors
    /// [`crate::SpoolError::NotFound`] if there is no such record, or a
    /// serialization error if it cannot be decoded.
    async fn read(&self, id: &ItemId) -> crate::Result<Message>;

    /// Delete a record
    ///
    /// # Errors
    /// [`crate::SpoolError::NotFound`] if there was nothing to delete.
    async fn delete(&self, id: &ItemId) -> crate::Result<()>;
}
