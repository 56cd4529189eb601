#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{path::PathBuf, sync::Arc, time::SystemTime};

use hermod_common::{ItemId, Message, Recipient, RecipientKind, RecipientStatus, Route};
use hermod_spool::{BackingStore, FileBackingStore, SpoolError, ValidationError};
use pretty_assertions::assert_eq;

fn message(id: &str) -> Message {
    Message {
        id: ItemId::parse(id).unwrap(),
        from: "from".to_string(),
        created_at: SystemTime::now(),
        data: Arc::from(&b"Subject: test\r\n\r\ndata\r\n"[..]),
        recipients: vec![
            Recipient::new("am@loco", "am@loco", RecipientKind::Email(Route::Local)),
            Recipient::new("x@remote", "x@remote", RecipientKind::Email(Route::Remote)),
            Recipient::new("true", "|true", RecipientKind::Pipe),
        ],
    }
}

fn store(dir: &tempfile::TempDir) -> FileBackingStore {
    let store = FileBackingStore::builder()
        .path(dir.path())
        .build()
        .expect("tempdir is a valid spool path");
    store.init().unwrap();
    store
}

#[test]
fn test_path_validation() {
    assert!(matches!(
        FileBackingStore::builder()
            .path("/var/spool/../etc/passwd")
            .build(),
        Err(ValidationError::ParentDir(_))
    ));
    assert!(matches!(
        FileBackingStore::builder().path("relative/path").build(),
        Err(ValidationError::NotAbsolute(_))
    ));

    for path in ["/etc/spool", "/bin/messages", "/proc/mail", "/dev/spool"] {
        let result = FileBackingStore::builder().path(PathBuf::from(path)).build();
        assert!(
            result.unwrap_err().to_string().contains("system directory"),
            "Path {path} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_write_replace_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    let mut msg = message("01ARZ3NDEKTSV4RRFFQ69G5FAV");
    store.write(&msg).await.unwrap();
    assert_eq!(store.read(&msg.id).await.unwrap(), msg);

    msg.recipients[0].status = RecipientStatus::Success;
    msg.recipients[1].attempts = 2;
    msg.recipients[1].last_failure = Some("421 try later".to_string());
    store.write(&msg).await.unwrap();

    assert_eq!(store.read(&msg.id).await.unwrap(), msg);
    assert!(dir.path().join("01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").exists());
    assert!(!dir.path().join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").exists());
}

#[tokio::test]
async fn test_failed_write_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    // A non-empty directory where the record belongs makes the write fail
    let blocked = dir.path().join("01ARZ3NDEKTSV4RRFFQ69G5FAV.bin");
    std::fs::create_dir(&blocked).unwrap();
    std::fs::write(blocked.join("occupant"), b"x").unwrap();

    let msg = message("01ARZ3NDEKTSV4RRFFQ69G5FAV");
    assert!(matches!(store.write(&msg).await, Err(SpoolError::Io(_))));

    assert!(!dir.path().join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").exists());
}

#[tokio::test]
async fn test_list_ignores_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.write(&message("01BX5ZZKBKACTAV9WEVGEMMVS0")).await.unwrap();
    store.write(&message("01ARZ3NDEKTSV4RRFFQ69G5FAV")).await.unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
    std::fs::write(dir.path().join(".tmp_01CX5ZZKBKACTAV9WEVGEMMVS0.bin"), b"half").unwrap();

    let ids: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    assert_eq!(
        ids,
        vec!["01ARZ3NDEKTSV4RRFFQ69G5FAV", "01BX5ZZKBKACTAV9WEVGEMMVS0"]
    );
}

#[tokio::test]
async fn test_init_purges_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.bin");
    std::fs::write(&stale, b"partial").unwrap();

    let _store = store(&dir);

    assert!(!stale.exists());
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let msg = message("01ARZ3NDEKTSV4RRFFQ69G5FAV");

    store.write(&msg).await.unwrap();
    store.delete(&msg.id).await.unwrap();

    assert!(matches!(store.delete(&msg.id).await, Err(SpoolError::NotFound(_))));
    assert!(matches!(store.read(&msg.id).await, Err(SpoolError::NotFound(_))));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_record_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let id = ItemId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();

    std::fs::write(dir.path().join(id.filename()), b"\xff\xff not a record").unwrap();

    assert!(matches!(
        store.read(&id).await,
        Err(SpoolError::Serialization(_))
    ));
}

#[test]
fn test_init_rejects_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("spool");
    std::fs::write(&file, b"").unwrap();

    let store = FileBackingStore::builder().path(&file).build().unwrap();
    assert!(matches!(
        store.init(),
        Err(SpoolError::Validation(ValidationError::NotDirectory(_)))
    ));
}
