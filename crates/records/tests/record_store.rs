//! Record store staging, uniqueness and guard behavior

use std::sync::Arc;
use tandem_common::{CoordinateKey, Coordinates, Record, RecordId};
use tandem_records::{FjallRecordStore, RecordStore, RecordStoreConfig, RecordStoreError};

fn open_store() -> (tempfile::TempDir, FjallRecordStore) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RecordStoreConfig::new(dir.path().join("records"));
    config.persist_mode = fjall::PersistMode::Buffer;
    let store = FjallRecordStore::open(&config).unwrap();
    (dir, store)
}

fn record(name: &str, x: i32, y: f64) -> Record {
    Record::new(name, Some(Coordinates::new(x, y)))
}

#[tokio::test]
async fn test_staged_import_invisible_until_commit() {
    let (_dir, store) = open_store();

    let staged = store
        .execute_import(vec![record("a", 1, 1.0), record("b", 2, 2.0)])
        .await
        .unwrap();
    assert!(staged.result.is_success());
    assert_eq!(staged.result.imported_count, 2);
    assert_eq!(staged.transaction.staged_count(), 2);

    assert_eq!(store.len().unwrap(), 0);
    assert!(
        store
            .find_by_coordinates(&CoordinateKey::new(1, 1.0))
            .unwrap()
            .is_none()
    );

    staged.transaction.commit().await.unwrap();

    assert_eq!(store.len().unwrap(), 2);
    let (_, found) = store
        .find_by_coordinates(&CoordinateKey::new(2, 2.0))
        .unwrap()
        .unwrap();
    assert_eq!(found.name, "b");
    assert_eq!(store.reserved_keys(), 0);
}

#[tokio::test]
async fn test_rollback_discards_and_releases() {
    let (_dir, store) = open_store();

    let staged = store
        .execute_import(vec![record("a", 1, 1.0)])
        .await
        .unwrap();
    assert_eq!(store.reserved_keys(), 1);

    staged.transaction.rollback().await;

    assert_eq!(store.len().unwrap(), 0);
    assert_eq!(store.reserved_keys(), 0);
    assert!(store.create_record(record("again", 1, 1.0)).await.is_ok());
}

#[tokio::test]
async fn test_dropped_transaction_releases_reservations() {
    let (_dir, store) = open_store();

    let staged = store
        .execute_import(vec![record("a", 1, 1.0)])
        .await
        .unwrap();
    drop(staged);

    assert_eq!(store.reserved_keys(), 0);
    assert_eq!(store.len().unwrap(), 0);
}

#[tokio::test]
async fn test_duplicates_within_file_rejected() {
    let (_dir, store) = open_store();

    let staged = store
        .execute_import(vec![
            record("a", 1, 1.0),
            record("b", 2, 2.0),
            record("c", 1, 1.0),
        ])
        .await
        .unwrap();

    assert!(!staged.result.is_success());
    assert_eq!(staged.result.imported_count, 0);
    assert_eq!(staged.result.failed_count, 1);
    assert!(staged.result.errors[0].starts_with("Row 3:"));
    assert_eq!(staged.transaction.staged_count(), 0);
    assert_eq!(store.reserved_keys(), 0);
}

#[tokio::test]
async fn test_existing_coordinates_reject_whole_import() {
    let (_dir, store) = open_store();
    store.create_record(record("existing", 5, 5.0)).await.unwrap();

    let staged = store
        .execute_import(vec![record("new", 6, 6.0), record("clash", 5, 5.0)])
        .await
        .unwrap();

    assert!(!staged.result.is_success());
    assert_eq!(staged.result.failed_count, 1);
    assert!(staged.result.errors[0].starts_with("Row 2:"));
    // The valid row was not reserved past the rejection
    assert_eq!(store.reserved_keys(), 0);

    staged.transaction.commit().await.unwrap();
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn test_pending_import_blocks_other_writers() {
    let (_dir, store) = open_store();

    let first = store
        .execute_import(vec![record("a", 1, 1.0)])
        .await
        .unwrap();

    let err = store.create_record(record("b", 1, 1.0)).await.unwrap_err();
    assert!(matches!(err, RecordStoreError::DuplicateCoordinates(_)));

    let second = store
        .execute_import(vec![record("c", 1, 1.0)])
        .await
        .unwrap();
    assert!(!second.result.is_success());
    second.transaction.rollback().await;

    first.transaction.commit().await.unwrap();
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn test_records_without_coordinates_are_unguarded() {
    let (_dir, store) = open_store();

    store.create_record(Record::new("free", None)).await.unwrap();
    store.create_record(Record::new("free", None)).await.unwrap();

    let staged = store
        .execute_import(vec![Record::new("x", None), Record::new("y", None)])
        .await
        .unwrap();
    assert!(staged.result.is_success());
    staged.transaction.commit().await.unwrap();

    assert_eq!(store.len().unwrap(), 4);
    assert!(store.guard().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_with_same_key() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_record(record(&format!("r{}", i), 4, 2.5))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(RecordStoreError::DuplicateCoordinates(key)) => {
                assert_eq!(key, CoordinateKey::new(4, 2.5));
                duplicates += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(duplicates, 15);
    assert_eq!(store.len().unwrap(), 1);
    assert!(!store.guard().is_locked(&CoordinateKey::new(4, 2.5)));
}

#[tokio::test]
async fn test_update_excludes_own_identity() {
    let (_dir, store) = open_store();
    let a = store.create_record(record("a", 1, 1.0)).await.unwrap();
    store.create_record(record("b", 2, 2.0)).await.unwrap();

    // Same coordinates as itself: allowed
    store.update_record(a, record("a2", 1, 1.0)).await.unwrap();
    assert_eq!(store.get(a).unwrap().unwrap().name, "a2");

    // Coordinates of another record: rejected
    let err = store.update_record(a, record("a3", 2, 2.0)).await.unwrap_err();
    assert!(matches!(err, RecordStoreError::DuplicateCoordinates(_)));

    // Move to free coordinates: old key becomes free
    store.update_record(a, record("a4", 3, 3.0)).await.unwrap();
    assert!(
        store
            .find_by_coordinates(&CoordinateKey::new(1, 1.0))
            .unwrap()
            .is_none()
    );
    assert!(store.create_record(record("c", 1, 1.0)).await.is_ok());
}

#[tokio::test]
async fn test_update_missing_record() {
    let (_dir, store) = open_store();
    let err = store
        .update_record(RecordId(999), record("x", 1, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, RecordStoreError::NotFound(RecordId(999))));
}

#[tokio::test]
async fn test_unavailable_store() {
    let (_dir, store) = open_store();
    assert!(store.check_readiness().await);

    store.set_available(false);
    assert!(!store.check_readiness().await);

    let err = store.execute_import(vec![record("a", 1, 1.0)]).await.err().unwrap();
    assert!(matches!(err, RecordStoreError::Unavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_ids_continue_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordStoreConfig::new(dir.path().join("records"));

    let first = {
        let store = FjallRecordStore::open(&config).unwrap();
        store.create_record(record("a", 1, 1.0)).await.unwrap()
    };

    let store = FjallRecordStore::open(&config).unwrap();
    let second = store.create_record(record("b", 2, 2.0)).await.unwrap();
    assert!(second > first);
    assert_eq!(store.len().unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_racing_import_commit() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);

    for i in 0..50 {
        let staged = store
            .execute_import(vec![record("imported", i, 1.0)])
            .await
            .unwrap();
        let creator = {
            let store = store.clone();
            tokio::spawn(async move { store.create_record(record("direct", i, 1.0)).await })
        };
        tokio::task::yield_now().await;
        staged.transaction.commit().await.unwrap();

        let created = creator.await.unwrap();
        assert!(
            matches!(created, Err(RecordStoreError::DuplicateCoordinates(_))),
            "iteration {}: {:?}",
            i,
            created
        );
    }

    assert_eq!(store.len().unwrap(), 50);
    assert_eq!(store.reserved_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_racing_import_commit() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);

    for i in 0..50 {
        let id = store.create_record(record("mover", i, 100.0)).await.unwrap();
        let staged = store
            .execute_import(vec![record("imported", i, 1.0)])
            .await
            .unwrap();
        let updater = {
            let store = store.clone();
            tokio::spawn(async move { store.update_record(id, record("mover", i, 1.0)).await })
        };
        tokio::task::yield_now().await;
        staged.transaction.commit().await.unwrap();

        let updated = updater.await.unwrap();
        assert!(
            matches!(updated, Err(RecordStoreError::DuplicateCoordinates(_))),
            "iteration {}: {:?}",
            i,
            updated
        );
        let (owner, _) = store
            .find_by_coordinates(&CoordinateKey::new(i, 1.0))
            .unwrap()
            .unwrap();
        assert_ne!(owner, id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_import_racing_import_commit() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);

    for i in 0..50 {
        let first = store
            .execute_import(vec![record("first", i, 1.0)])
            .await
            .unwrap();
        let second = {
            let store = store.clone();
            tokio::spawn(async move {
                let staged = store
                    .execute_import(vec![record("second", i, 1.0)])
                    .await
                    .unwrap();
                let result = staged.result.clone();
                staged.transaction.rollback().await;
                result
            })
        };
        tokio::task::yield_now().await;
        first.transaction.commit().await.unwrap();

        let result = second.await.unwrap();
        assert!(!result.is_success(), "iteration {}: {:?}", i, result);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.imported_count, 0);
    }

    assert_eq!(store.len().unwrap(), 50);
    assert_eq!(store.reserved_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_racing_import_rollback() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);
    let mut created_count = 0;

    for i in 0..50 {
        let staged = store
            .execute_import(vec![record("imported", i, 1.0)])
            .await
            .unwrap();
        let creator = {
            let store = store.clone();
            tokio::spawn(async move { store.create_record(record("direct", i, 1.0)).await })
        };
        tokio::task::yield_now().await;
        staged.transaction.rollback().await;

        match creator.await.unwrap() {
            Ok(id) => {
                created_count += 1;
                let (owner, found) = store
                    .find_by_coordinates(&CoordinateKey::new(i, 1.0))
                    .unwrap()
                    .unwrap();
                assert_eq!(owner, id);
                assert_eq!(found.name, "direct");
            }
            Err(RecordStoreError::DuplicateCoordinates(_)) => {
                assert!(
                    store
                        .find_by_coordinates(&CoordinateKey::new(i, 1.0))
                        .unwrap()
                        .is_none()
                );
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(store.len().unwrap(), created_count);
    assert_eq!(store.reserved_keys(), 0);
}
