//! Coordinator fixtures
//!
//! Every test builds its own store, queue and backend; nothing is shared
//! between tests.

use estate_sync::local_db::{FileMedium, LocalStore, StorageMedium};
use estate_sync::offline::{BackoffStrategy, OfflineQueue};
use estate_sync::remote::MemoryRemote;
use estate_sync::shared::AppConfig;
use estate_sync::sync::SyncCoordinator;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A coordinator together with the parts tests inspect
pub struct Harness {
    pub coordinator: Arc<SyncCoordinator>,
    pub store: Arc<LocalStore>,
    pub queue: Arc<OfflineQueue>,
    pub remote: Arc<MemoryRemote>,
}

/// Settings for tests: short timeouts and backoff, no automatic pull
pub fn test_config() -> AppConfig {
    AppConfig::builder()
        .request_timeout(Duration::from_secs(2))
        .backoff(Duration::from_millis(10), Duration::from_millis(50))
        .pull_on_reconnect(false)
        .build()
        .expect("test config is valid")
}

/// In-memory coordinator over an empty backend
pub fn harness() -> Harness {
    harness_with(Arc::new(MemoryRemote::new()), test_config())
}

/// In-memory coordinator over `remote`
pub fn harness_with(remote: Arc<MemoryRemote>, config: AppConfig) -> Harness {
    let store = Arc::new(LocalStore::in_memory());
    let queue = Arc::new(OfflineQueue::in_memory());
    build(store, queue, remote, config)
}

/// Coordinator persisting to `dir`, as an app session would
pub fn file_harness(dir: &Path, remote: Arc<MemoryRemote>) -> Harness {
    let config = test_config();
    let medium: Arc<dyn StorageMedium> = Arc::new(FileMedium::open(dir).expect("open file medium"));
    let store = Arc::new(LocalStore::open(medium.clone()));
    let queue = Arc::new(OfflineQueue::open(medium, BackoffStrategy::from_config(&config)));
    build(store, queue, remote, config)
}

fn build(
    store: Arc<LocalStore>,
    queue: Arc<OfflineQueue>,
    remote: Arc<MemoryRemote>,
    config: AppConfig,
) -> Harness {
    let coordinator = Arc::new(SyncCoordinator::new(
        store.clone(),
        queue.clone(),
        remote.clone(),
        config,
    ));
    Harness {
        coordinator,
        store,
        queue,
        remote,
    }
}

/// Field changes for `update` from a JSON object literal
pub fn changes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("changes must be an object, got {}", other),
    }
}
