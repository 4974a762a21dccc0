//! Offline/online scenarios driven through the sync coordinator

use crate::common::{changes, harness, harness_with, test_config};
use crate::{assert_ok, assert_sync_state};
use assert_matches::assert_matches;
use estate_sync::offline::QueueOperation;
use estate_sync::remote::{MemoryRemote, RemoteOperation};
use estate_sync::schema::normalize;
use estate_sync::shared::{ChangeEvent, CommandError, Entity, EntityType, HandlerError, RemoteError, SyncState};
use estate_sync::sync::{SyncPhase, WriteDelivery};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn synced(entity_type: EntityType, record: Value) -> Entity {
    normalize(entity_type, &record)
        .expect("valid record")
        .with_sync_state(SyncState::Synced)
}

#[tokio::test]
async fn test_offline_create_is_listed_and_uploaded_once() {
    let h = harness();

    let outcome = assert_ok!(
        h.coordinator
            .create(EntityType::Property, json!({"id": "p1", "title": "A", "updatedAt": 100}))
            .await
    );
    assert!(outcome.is_queued());

    let listed = h.store.list(EntityType::Property);
    assert_eq!(listed.ids(), vec!["p1"]);
    let pending = h.queue.peek_pending(EntityType::Property);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, QueueOperation::Create);
    assert_eq!(pending[0].id, "p1");

    let result = h.coordinator.connectivity_restored().await;

    assert_eq!(result.confirmed.len(), 1);
    let creates = h.remote.calls_of(RemoteOperation::Create);
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].payload["id"], json!("p1"));
    assert_eq!(creates[0].payload["title"], json!("A"));
    assert_eq!(creates[0].payload["updatedAt"], json!(100));
    assert!(h.queue.is_empty());
    assert_sync_state!(h.store, EntityType::Property, "p1", SyncState::Synced);
    assert_eq!(h.coordinator.phase(), SyncPhase::OnlineIdle);
    assert_eq!(h.coordinator.status().to_string(), "All changes synced");
}

#[tokio::test]
async fn test_offline_updates_collapse_into_one_call() {
    let h = harness();
    let contact = synced(EntityType::Contact, json!({"id": "c1", "firstName": "Ann", "updatedAt": 10}));
    h.store.put(contact.clone());
    h.remote.insert(contact);

    assert_ok!(
        h.coordinator
            .update(EntityType::Contact, "c1", changes(json!({"phone": "555-1"})))
            .await
    );
    assert_ok!(
        h.coordinator
            .update(EntityType::Contact, "c1", changes(json!({"phone": "555-2"})))
            .await
    );

    let pending = h.queue.peek_pending(EntityType::Contact);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, QueueOperation::Update);
    assert_eq!(pending[0].payload["phone"], json!("555-2"));
    assert_eq!(h.coordinator.status().to_string(), "1 change pending sync");

    h.coordinator.connectivity_restored().await;

    assert_eq!(h.remote.calls_of(RemoteOperation::Update).len(), 1);
    assert_eq!(h.remote.get(EntityType::Contact, "c1").unwrap().text("phone"), Some("555-2"));
    assert_sync_state!(h.store, EntityType::Contact, "c1", SyncState::Synced);
}

#[tokio::test]
async fn test_delete_discards_queued_update() {
    let h = harness();
    let deal = synced(EntityType::Deal, json!({"id": "d1", "title": "Loft sale", "updatedAt": 10}));
    h.store.put(deal.clone());
    h.remote.insert(deal);

    assert_ok!(
        h.coordinator
            .update(EntityType::Deal, "d1", changes(json!({"stage": "offer"})))
            .await
    );
    let outcome = assert_ok!(h.coordinator.delete(EntityType::Deal, "d1").await);
    assert!(outcome.is_queued());
    assert!(!h.store.contains(EntityType::Deal, "d1"));

    let pending = h.queue.peek_pending(EntityType::Deal);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, QueueOperation::Delete);

    h.coordinator.connectivity_restored().await;
    assert!(h.remote.calls_of(RemoteOperation::Update).is_empty());
    assert_eq!(h.remote.calls_of(RemoteOperation::Delete).len(), 1);
    assert!(h.remote.get(EntityType::Deal, "d1").is_none());
}

#[tokio::test]
async fn test_failing_subscriber_does_not_block_others() {
    let h = harness();
    h.store.put(synced(EntityType::Property, json!({"id": "p1", "title": "A", "updatedAt": 100})));

    h.store.subscribe_fn(EntityType::Property, |_event: &ChangeEvent| {
        Err(HandlerError::new("view crashed"))
    });
    let received: Arc<Mutex<Vec<ChangeEvent>>> = Arc::default();
    let sink = received.clone();
    h.store.subscribe_fn(EntityType::Property, move |event: &ChangeEvent| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });

    let outcome = assert_ok!(
        h.coordinator
            .update(EntityType::Property, "p1", changes(json!({"title": "B"})))
            .await
    );

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_matches!(&received[0], ChangeEvent::Updated(entity) if entity.text("title") == Some("B"));
    assert!(outcome.entity.updated_at > 100);
    assert_eq!(h.store.get(EntityType::Property, "p1").unwrap().updated_at, outcome.entity.updated_at);
    assert_eq!(h.store.bus().handler_failures(), 1);
}

#[tokio::test]
async fn test_offline_mutations_replay_once_in_order() {
    let h = harness();
    assert_ok!(h.coordinator.create(EntityType::Task, json!({"id": "t1", "title": "Call owner"})).await);
    assert_ok!(h.coordinator.create(EntityType::Task, json!({"id": "t2", "title": "Book photos"})).await);
    assert_ok!(h.coordinator.create(EntityType::Contact, json!({"id": "c1", "firstName": "Ann"})).await);
    h.coordinator.connectivity_restored().await;
    h.coordinator.connectivity_lost();
    h.remote.clear_calls();

    assert_ok!(
        h.coordinator
            .update(EntityType::Task, "t1", changes(json!({"done": true})))
            .await
    );
    assert_ok!(h.coordinator.delete(EntityType::Task, "t2").await);
    assert_ok!(
        h.coordinator
            .update(EntityType::Contact, "c1", changes(json!({"lastName": "Lee"})))
            .await
    );
    assert_ok!(h.coordinator.create(EntityType::Task, json!({"id": "t3", "title": "Sign"})).await);

    let result = h.coordinator.connectivity_restored().await;

    assert_eq!(result.confirmed.len(), 4);
    let calls: Vec<(RemoteOperation, String)> = h
        .remote
        .calls()
        .into_iter()
        .map(|call| (call.operation, call.id))
        .collect();
    assert_eq!(
        calls,
        vec![
            (RemoteOperation::Update, "t1".to_string()),
            (RemoteOperation::Delete, "t2".to_string()),
            (RemoteOperation::Update, "c1".to_string()),
            (RemoteOperation::Create, "t3".to_string()),
        ]
    );
    assert_eq!(h.remote.get(EntityType::Task, "t1").unwrap().field("done"), Some(&json!(true)));
    assert!(h.remote.get(EntityType::Task, "t2").is_none());
    assert_eq!(h.remote.records(EntityType::Task).len(), 2);
}

#[tokio::test]
async fn test_newer_remote_version_wins_on_pull() {
    let h = harness();
    h.store.put(synced(EntityType::Property, json!({"id": "p1", "title": "local", "updatedAt": 100})));
    h.store.put(synced(EntityType::Property, json!({"id": "p2", "title": "local", "updatedAt": 300})));
    h.store.put(synced(EntityType::Property, json!({"id": "gone", "title": "sold", "updatedAt": 50})));
    h.remote.insert(synced(EntityType::Property, json!({"id": "p1", "title": "remote", "updatedAt": 200})));
    h.remote.insert(synced(EntityType::Property, json!({"id": "p2", "title": "remote", "updatedAt": 200})));
    h.remote.insert(synced(EntityType::Property, json!({"id": "p3", "title": "new", "updatedAt": 10})));

    let events: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = events.clone();
    h.store.subscribe_fn(EntityType::Property, move |event: &ChangeEvent| {
        sink.lock().unwrap().push(format!("{} {}", event.operation(), event.id()));
        Ok(())
    });

    let report = assert_ok!(h.coordinator.refresh(EntityType::Property).await);

    assert_eq!(report.updated, 1);
    assert_eq!(report.kept, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(h.store.get(EntityType::Property, "p1").unwrap().text("title"), Some("remote"));
    assert_eq!(h.store.get(EntityType::Property, "p2").unwrap().text("title"), Some("local"));
    assert_sync_state!(h.store, EntityType::Property, "p3", SyncState::Synced);
    assert!(!h.store.contains(EntityType::Property, "gone"));

    let events = events.lock().unwrap();
    assert!(events.contains(&"update p1".to_string()));
    assert!(events.contains(&"create p3".to_string()));
    assert!(events.contains(&"delete gone".to_string()));
}

#[tokio::test]
async fn test_newer_remote_version_drops_superseded_queued_work() {
    let h = harness();
    h.store.put(synced(EntityType::Contact, json!({"id": "c1", "phone": "1", "updatedAt": 100})));
    assert_ok!(
        h.coordinator
            .update(EntityType::Contact, "c1", changes(json!({"phone": "2"})))
            .await
    );
    let local_stamp = h.store.get(EntityType::Contact, "c1").unwrap().updated_at;
    h.remote.insert(synced(
        EntityType::Contact,
        json!({"id": "c1", "phone": "3", "updatedAt": local_stamp + 1_000}),
    ));

    assert_ok!(h.coordinator.refresh(EntityType::Contact).await);

    assert!(h.queue.is_empty());
    let local = h.store.get(EntityType::Contact, "c1").unwrap();
    assert_eq!(local.text("phone"), Some("3"));
    assert_eq!(local.sync_state, SyncState::Synced);
    assert_eq!(h.coordinator.metrics().remote_wins, 1);
}

#[tokio::test]
async fn test_unuploaded_records_survive_pull() {
    let h = harness();
    assert_ok!(h.coordinator.create(EntityType::Media, json!({"id": "m1", "uri": "a.jpg"})).await);

    let report = assert_ok!(h.coordinator.refresh(EntityType::Media).await);

    assert_eq!(report.removed, 0);
    assert_sync_state!(h.store, EntityType::Media, "m1", SyncState::PendingUpload);
}

#[tokio::test]
async fn test_pull_does_not_resurrect_queued_delete() {
    let h = harness();
    let agent = synced(EntityType::Agent, json!({"id": "a1", "name": "Rui", "updatedAt": 10}));
    h.store.put(agent.clone());
    h.remote.insert(agent);
    assert_ok!(h.coordinator.delete(EntityType::Agent, "a1").await);

    let report = assert_ok!(h.coordinator.refresh(EntityType::Agent).await);

    assert_eq!(report.inserted, 0);
    assert!(!h.store.contains(EntityType::Agent, "a1"));
}

#[tokio::test]
async fn test_pull_all_reports_failed_collections() {
    let config = estate_sync::shared::AppConfig {
        pull_entity_types: vec![EntityType::Property, EntityType::Deal],
        ..test_config()
    };
    let h = harness_with(Arc::new(MemoryRemote::new()), config);
    h.remote.insert(synced(EntityType::Deal, json!({"id": "d1", "updatedAt": 5})));
    h.remote.set_unreachable(true);

    let report = h.coordinator.pull_all().await;
    assert_eq!(report.failed.len(), 2);

    h.remote.set_unreachable(false);
    let report = h.coordinator.pull_all().await;
    assert!(report.failed.is_empty());
    assert_eq!(report.inserted, 1);
}

#[tokio::test]
async fn test_connectivity_lost_mid_drain_keeps_unconfirmed_actions() {
    let h = harness();
    for id in ["t1", "t2", "t3"] {
        assert_ok!(h.coordinator.create(EntityType::Task, json!({"id": id})).await);
    }
    h.remote.set_latency(Some(Duration::from_millis(100)));

    let coordinator = h.coordinator.clone();
    let drain = tokio::spawn(async move { coordinator.connectivity_restored().await });
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.coordinator.connectivity_lost();
    let result = drain.await.unwrap();

    assert!(result.cancelled);
    assert_eq!(h.coordinator.phase(), SyncPhase::Offline);
    assert_eq!(result.confirmed.len() + h.queue.len(), 3);
    assert!(!result.confirmed.is_empty());
    for confirmed in &result.confirmed {
        assert_sync_state!(h.store, EntityType::Task, &confirmed.id, SyncState::Synced);
    }

    h.remote.set_latency(None);
    let resumed = h.coordinator.connectivity_restored().await;
    assert!(!resumed.cancelled);
    assert!(h.queue.is_empty());
    assert_eq!(h.remote.records(EntityType::Task).len(), 3);
}

#[tokio::test]
async fn test_rejection_surfaces_payload_and_conflict() {
    let h = harness();
    assert_ok!(h.coordinator.create(EntityType::Deal, json!({"id": "d1", "value": -5})).await);
    h.remote
        .fail_next(RemoteError::validation("value must be positive", json!({"value": -5})));

    let result = h.coordinator.connectivity_restored().await;

    assert_eq!(result.rejected.len(), 1);
    let rejected = &h.coordinator.rejected()[0];
    assert_eq!(rejected.rejected_payload, json!({"value": -5}));
    assert_matches!(rejected.error(), RemoteError::Validation { .. });
    assert_sync_state!(h.store, EntityType::Deal, "d1", SyncState::Conflict);
    assert_eq!(h.coordinator.status().to_string(), "All changes synced, 1 rejected");

    // the agent corrects the deal offline, then retries the refused create
    h.coordinator.connectivity_lost();
    assert_ok!(
        h.coordinator
            .update(EntityType::Deal, "d1", changes(json!({"value": 5})))
            .await
    );
    let seq = h.coordinator.rejected()[0].action.seq;
    assert!(h.coordinator.retry_rejected(seq, None).is_some());
    let pending = h.queue.peek_pending(EntityType::Deal);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, QueueOperation::Create);

    let result = h.coordinator.connectivity_restored().await;
    assert_eq!(result.confirmed.len(), 1);
    assert_eq!(h.remote.get(EntityType::Deal, "d1").unwrap().field("value"), Some(&json!(5)));
    assert_sync_state!(h.store, EntityType::Deal, "d1", SyncState::Synced);
    assert_eq!(h.coordinator.status().rejected, 0);
}

#[tokio::test]
async fn test_auth_failure_holds_queue_until_reauthentication() {
    let h = harness();
    assert_ok!(h.coordinator.create(EntityType::Contact, json!({"id": "c1"})).await);
    h.remote.fail_next(RemoteError::auth("token expired"));

    let result = h.coordinator.connectivity_restored().await;

    assert_eq!(result.auth_blocked, vec![EntityType::Contact]);
    let status = h.coordinator.status();
    assert!(status.auth_required);
    assert_eq!(status.pending, 1);
    assert_eq!(status.held, 1);
    assert_eq!(status.to_string(), "1 change pending sync, sign-in required");

    let outcome = assert_ok!(
        h.coordinator
            .update(EntityType::Contact, "c1", changes(json!({"email": "ann@example.com"})))
            .await
    );
    assert_eq!(outcome.delivery, WriteDelivery::Queued);

    let released = h.coordinator.reauthenticated().await;
    assert_eq!(released.confirmed.len(), 1);
    assert_eq!(
        h.remote.get(EntityType::Contact, "c1").unwrap().text("email"),
        Some("ann@example.com")
    );
}

#[tokio::test]
async fn test_local_command_errors() {
    let h = harness();
    assert_ok!(h.coordinator.create(EntityType::Task, json!({"id": "t1"})).await);

    assert_matches!(
        h.coordinator.create(EntityType::Task, json!({"id": "t1"})).await,
        Err(CommandError::AlreadyExists { .. })
    );
    assert_matches!(
        h.coordinator.create(EntityType::Task, json!(["not", "an", "object"])).await,
        Err(CommandError::Schema(_))
    );
    assert_matches!(
        h.coordinator.update(EntityType::Task, "t9", changes(json!({}))).await,
        Err(CommandError::NotFound { .. })
    );
    assert_eq!(h.queue.len(), 1);
}
