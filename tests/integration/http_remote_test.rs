//! HTTP adapter against a mocked REST backend

use crate::assert_ok;
use crate::common::{harness, test_config, MockBackend, TEST_TOKEN};
use assert_matches::assert_matches;
use estate_sync::local_db::LocalStore;
use estate_sync::offline::OfflineQueue;
use estate_sync::remote::{Credentials, RemoteAdapter};
use estate_sync::schema::normalize;
use estate_sync::shared::{AppConfig, EntityType, RemoteError, SyncState};
use estate_sync::sync::SyncCoordinator;
use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_fetch_all_normalizes_records() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/api/properties"))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"_id": "p1", "title": "Loft", "listing_price": 485000, "updated_at": 1700000000000i64},
            {"title": "no id, skipped"},
            {"id": "p2", "zip_code": "1100-001"}
        ])))
        .expect(1)
        .mount(&backend.server)
        .await;

    let entities = assert_ok!(backend.remote.fetch_all(EntityType::Property).await);

    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].id, "p1");
    assert_eq!(entities[0].field("price"), Some(&json!(485000)));
    assert_eq!(entities[0].updated_at, 1_700_000_000_000);
    assert_eq!(entities[1].text("postalCode"), Some("1100-001"));
}

#[tokio::test]
async fn test_fetch_all_accepts_envelopes() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/api/check-ins"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "k1", "lat": 1.5}]})))
        .mount(&backend.server)
        .await;

    let entities = assert_ok!(backend.remote.fetch_all(EntityType::CheckIn).await);
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].field("latitude"), Some(&json!(1.5)));
}

#[tokio::test]
async fn test_create_posts_canonical_record() {
    let backend = MockBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/api/contacts"))
        .and(body_partial_json(json!({"id": "c1", "firstName": "Ann", "updatedAt": 100})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "srv-9", "first_name": "Ann", "updatedAt": 150
        })))
        .expect(1)
        .mount(&backend.server)
        .await;

    let local = normalize(EntityType::Contact, &json!({"id": "c1", "firstName": "Ann", "updatedAt": 100})).unwrap();
    let created = assert_ok!(backend.remote.create(EntityType::Contact, &local).await);

    assert_eq!(created.id, "srv-9");
    assert_eq!(created.updated_at, 150);
    assert_eq!(created.text("firstName"), Some("Ann"));
}

#[tokio::test]
async fn test_update_with_empty_body_echoes_patch() {
    let backend = MockBackend::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/deals/d1"))
        .and(body_partial_json(json!({"stage": "offer"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&backend.server)
        .await;

    let mut partial = Map::new();
    partial.insert("stage".to_string(), json!("offer"));
    partial.insert("updatedAt".to_string(), json!(500));
    let updated = assert_ok!(backend.remote.update(EntityType::Deal, "d1", &partial).await);

    assert_eq!(updated.id, "d1");
    assert_eq!(updated.text("stage"), Some("offer"));
    assert_eq!(updated.updated_at, 500);
}

#[tokio::test]
async fn test_delete_of_missing_record_succeeds() {
    let backend = MockBackend::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/t1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&backend.server)
        .await;

    assert_ok!(backend.remote.delete(EntityType::Task, "t1").await);
}

#[tokio::test]
async fn test_status_codes_map_to_error_taxonomy() {
    let backend = MockBackend::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "token expired"})))
        .mount(&backend.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&backend.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/deals"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "value must be positive"})))
        .mount(&backend.server)
        .await;

    assert_matches!(
        backend.remote.fetch_all(EntityType::Agent).await,
        Err(RemoteError::Auth { message }) if message == "401 token expired"
    );
    let unavailable = backend.remote.fetch_all(EntityType::Task).await.unwrap_err();
    assert!(unavailable.is_retryable());

    let deal = normalize(EntityType::Deal, &json!({"id": "d1", "value": -5})).unwrap();
    match backend.remote.create(EntityType::Deal, &deal).await {
        Err(RemoteError::Validation { message, payload }) => {
            assert_eq!(message, "422 value must be positive");
            assert_eq!(payload["value"], json!(-5));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_replayed_create_of_existing_record_is_confirmed() {
    let backend = MockBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "task t1 exists"})))
        .expect(1)
        .mount(&backend.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/tasks/t1"))
        .and(body_partial_json(json!({"title": "Call owner", "description": "after visit"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t1", "title": "Call owner", "description": "after visit", "updatedAt": 300
        })))
        .expect(1)
        .mount(&backend.server)
        .await;

    let h = harness();
    let coordinator = SyncCoordinator::new(
        h.store.clone(),
        h.queue.clone(),
        Arc::new(backend.remote.clone()),
        test_config(),
    );
    assert_ok!(
        coordinator
            .create(EntityType::Task, json!({"id": "t1", "title": "Call owner", "updatedAt": 200}))
            .await
    );
    let mut description = Map::new();
    description.insert("description".to_string(), json!("after visit"));
    assert_ok!(coordinator.update(EntityType::Task, "t1", description).await);

    let result = coordinator.connectivity_restored().await;

    assert_eq!(result.confirmed.len(), 1);
    assert!(result.rejected.is_empty());
    assert!(coordinator.rejected().is_empty());
    let task = h.store.get(EntityType::Task, "t1").unwrap();
    assert_eq!(task.sync_state, SyncState::Synced);
    assert_eq!(task.text("description"), Some("after visit"));
}

#[tokio::test]
async fn test_create_conflict_on_unknown_record_is_rejected() {
    let backend = MockBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "email already registered"})))
        .mount(&backend.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/agents/a1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&backend.server)
        .await;

    let agent = normalize(EntityType::Agent, &json!({"id": "a1", "email": "ann@example.com"})).unwrap();
    assert_matches!(
        backend.remote.create(EntityType::Agent, &agent).await,
        Err(RemoteError::Validation { message, payload })
            if message == "409 email already registered" && payload["id"] == json!("a1")
    );
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = MockBackend::start_with(Credentials::with_token(TEST_TOKEN), Duration::from_millis(100)).await;
    Mock::given(method("GET"))
        .and(path("/api/media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(2)))
        .mount(&backend.server)
        .await;

    assert_matches!(
        backend.remote.fetch_all(EntityType::Media).await,
        Err(RemoteError::Timeout { .. })
    );
}

#[tokio::test]
async fn test_coordinator_adopts_server_id_over_http() {
    let backend = MockBackend::start().await;
    Mock::given(method("POST"))
        .and(path("/api/properties"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "srv-1", "title": "Loft"})))
        .expect(1)
        .mount(&backend.server)
        .await;

    let config = AppConfig::builder().pull_on_reconnect(false).build().unwrap();
    let store = Arc::new(LocalStore::in_memory());
    let coordinator = SyncCoordinator::new(
        store.clone(),
        Arc::new(OfflineQueue::in_memory()),
        Arc::new(backend.remote.clone()),
        config,
    );

    assert_ok!(coordinator.create(EntityType::Property, json!({"id": "tmp-1", "title": "Loft"})).await);
    let result = coordinator.connectivity_restored().await;

    assert_eq!(result.confirmed.len(), 1);
    assert!(!store.contains(EntityType::Property, "tmp-1"));
    assert_eq!(store.get(EntityType::Property, "srv-1").unwrap().sync_state, SyncState::Synced);
}

#[tokio::test]
async fn test_missing_credentials_hold_writes() {
    let backend = MockBackend::start_with(Credentials::default(), Duration::from_secs(1)).await;
    let h = harness();
    let coordinator = SyncCoordinator::new(
        h.store.clone(),
        h.queue.clone(),
        Arc::new(backend.remote.clone()),
        h.coordinator.config().clone(),
    );

    assert_ok!(coordinator.create(EntityType::Task, json!({"id": "t1"})).await);
    coordinator.connectivity_restored().await;

    let status = coordinator.status();
    assert!(status.auth_required);
    assert_eq!(status.held, 1);
    let requests = backend.server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());

    backend.remote.credentials().set(TEST_TOKEN);
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&backend.server)
        .await;
    let released = coordinator.reauthenticated().await;
    assert_eq!(released.confirmed.len(), 1);
}
