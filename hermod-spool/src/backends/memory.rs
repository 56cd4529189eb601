use std::{
    collections::BTreeMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use hermod_common::{ItemId, Message};
use parking_lot::RwLock;

use crate::{BackingStore, SpoolError};

/// In-memory backing store
///
/// Records are kept encoded, exactly as the file store would hold them, so
/// anything that survives a round trip here survives one on disk too. Clones
/// share the same records.
///
/// Writes and deletes can be made to fail on demand, which is how queue
/// tests exercise persistence error handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackingStore {
    records: Arc<RwLock<BTreeMap<ItemId, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryBackingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.records.read().contains_key(id)
    }

    /// Store raw bytes under `id`, bypassing encoding
    pub fn insert_raw(&self, id: ItemId, bytes: Vec<u8>) {
        self.records.write().insert(id, bytes);
    }

    /// Make every subsequent write fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent delete fail with an I/O error
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool, op: &str) -> crate::Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(io::Error::other(format!("injected {op} failure")).into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn write(&self, message: &Message) -> crate::Result<()> {
        Self::injected(&self.fail_writes, "write")?;

        let record = crate::encode(message)?;
        self.records.write().insert(message.id.clone(), record);

        Ok(())
    }

    async fn list(&self) -> crate::Result<Vec<ItemId>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    async fn read(&self, id: &ItemId) -> crate::Result<Message> {
        let record = self
            .records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;

        crate::decode(&record)
    }

    async fn delete(&self, id: &ItemId) -> crate::Result<()> {
        Self::injected(&self.fail_deletes, "delete")?;

        self.records
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SpoolError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use hermod_common::{Recipient, RecipientKind, Route};

    use super::*;

    fn message(id: &str) -> Message {
        Message {
            id: ItemId::parse(id).unwrap(),
            from: "from".to_string(),
            created_at: SystemTime::now(),
            data: Arc::from(&b"data"[..]),
            recipients: vec![Recipient::new(
                "x@remote",
                "x@remote",
                RecipientKind::Email(Route::Remote),
            )],
        }
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let store = MemoryBackingStore::new();
        let msg = message("01ARZ3NDEKTSV4RRFFQ69G5FAV");

        store.write(&msg).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.read(&msg.id).await.unwrap(), msg);

        store.delete(&msg.id).await.unwrap();
        assert!(store.is_empty());
        assert!(store.delete(&msg.id).await.unwrap_err().is_not_found());
        assert!(store.read(&msg.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = MemoryBackingStore::new();
        for id in ["01BX5ZZKBKACTAV9WEVGEMMVS0", "01ARZ3NDEKTSV4RRFFQ69G5FAV"] {
            store.write(&message(id)).await.unwrap();
        }

        let ids = store.list().await.unwrap();
        assert_eq!(ids[0].as_str(), "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(ids[1].as_str(), "01BX5ZZKBKACTAV9WEVGEMMVS0");
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryBackingStore::new();
        let msg = message("01ARZ3NDEKTSV4RRFFQ69G5FAV");

        store.fail_writes(true);
        assert!(matches!(store.write(&msg).await, Err(SpoolError::Io(_))));
        assert!(store.is_empty());

        store.fail_writes(false);
        store.write(&msg).await.unwrap();

        store.fail_deletes(true);
        assert!(matches!(store.delete(&msg.id).await, Err(SpoolError::Io(_))));
        assert!(store.contains(&msg.id));
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let store = MemoryBackingStore::new();
        let id = ItemId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
        store.insert_raw(id.clone(), vec![0xff; 3]);

        assert!(matches!(
            store.read(&id).await,
            Err(SpoolError::Serialization(_))
        ));
    }
}
