//! Sessions over a file-backed medium

use crate::assert_ok;
use crate::common::{changes, file_harness, test_config};
use estate_sync::local_db::{LocalStore, MemoryMedium, StorageMedium};
use estate_sync::offline::{OfflineQueue, QueueOperation};
use estate_sync::remote::{MemoryRemote, RemoteOperation};
use estate_sync::shared::{EntityType, SyncState};
use estate_sync::sync::SyncCoordinator;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_offline_work_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MemoryRemote::new());

    {
        let session = file_harness(dir.path(), remote.clone());
        assert_ok!(
            session
                .coordinator
                .create(EntityType::Property, json!({"id": "p1", "title": "Loft", "updatedAt": 100}))
                .await
        );
        assert_ok!(
            session
                .coordinator
                .update(EntityType::Property, "p1", changes(json!({"city": "Porto"})))
                .await
        );
        assert_ok!(
            session
                .coordinator
                .create(EntityType::CheckIn, json!({"id": "k1", "property": "p1"}))
                .await
        );
    }

    let session = file_harness(dir.path(), remote.clone());
    assert!(!session.coordinator.status().persistence_degraded);
    let property = session.store.get(EntityType::Property, "p1").unwrap();
    assert_eq!(property.text("city"), Some("Porto"));
    assert_eq!(property.sync_state, SyncState::PendingUpload);
    assert_eq!(session.queue.len(), 2);
    assert_eq!(session.coordinator.status().to_string(), "2 changes pending sync");

    let result = session.coordinator.connectivity_restored().await;

    assert_eq!(result.confirmed.len(), 2);
    assert_eq!(remote.calls_of(RemoteOperation::Create).len(), 2);
    assert_eq!(remote.get(EntityType::Property, "p1").unwrap().text("city"), Some("Porto"));

    drop(session);
    let session = file_harness(dir.path(), remote);
    assert!(session.queue.is_empty());
    assert_eq!(
        session.store.get(EntityType::CheckIn, "k1").unwrap().sync_state,
        SyncState::Synced
    );
}

#[tokio::test]
async fn test_corrupted_collection_degrades_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("collections_contacts.json"), b"{not json").unwrap();

    let session = file_harness(dir.path(), Arc::new(MemoryRemote::new()));
    let status = session.coordinator.status();
    assert!(status.persistence_degraded);
    assert_eq!(status.to_string(), "All changes synced (not saved on this device)");

    // the session keeps working from memory
    assert_ok!(
        session
            .coordinator
            .create(EntityType::Contact, json!({"id": "c1", "firstName": "Ann"}))
            .await
    );
    assert!(session.store.contains(EntityType::Contact, "c1"));
    assert_eq!(
        std::fs::read(dir.path().join("collections_contacts.json")).unwrap(),
        b"{not json".to_vec()
    );
}

#[tokio::test]
async fn test_write_failure_keeps_session_alive() {
    let medium = Arc::new(MemoryMedium::new());
    let shared: Arc<dyn StorageMedium> = medium.clone();
    let store = Arc::new(LocalStore::open(shared.clone()));
    let queue = Arc::new(OfflineQueue::open(shared, Default::default()));
    let coordinator = SyncCoordinator::new(store.clone(), queue.clone(), Arc::new(MemoryRemote::new()), test_config());

    medium.set_fail_writes(true);
    let outcome = assert_ok!(coordinator.create(EntityType::Task, json!({"id": "t1", "title": "Call"})).await);

    assert!(outcome.is_queued());
    assert!(store.is_degraded());
    assert!(queue.degradation().is_some());
    assert_eq!(queue.peek_pending(EntityType::Task)[0].operation, QueueOperation::Create);

    let result = coordinator.connectivity_restored().await;
    assert_eq!(result.confirmed.len(), 1);
    assert!(coordinator.status().persistence_degraded);
}
