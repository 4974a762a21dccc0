//! Estate Sync demo
//!
//! Walks through an offline field session: records are captured while
//! offline, then connectivity returns and the queue drains. Runs against the
//! backend at `CLIENT_API_URL` when `ESTATE_SYNC_TOKEN` is set, against an
//! in-memory backend otherwise.

use estate_sync::config::Config;
use estate_sync::local_db::{FileMedium, LocalStore, StorageMedium};
use estate_sync::logging::init_tracing;
use estate_sync::offline::OfflineQueue;
use estate_sync::remote::{HttpRemote, MemoryRemote, RemoteAdapter};
use estate_sync::shared::{EntityType, HandlerError};
use estate_sync::sync::{NetworkMonitor, SyncCoordinator, SyncPhase, SyncService};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();
    init_tracing("info");

    let config = Config::from_env()?;
    tracing::info!("[Demo] storage at {}", config.storage_dir().display());

    let medium: Arc<dyn StorageMedium> = Arc::new(FileMedium::open(config.storage_dir())?);
    let remote: Arc<dyn RemoteAdapter> = if config.get_token().is_some() {
        tracing::info!("[Demo] backend {}", config.server_url());
        Arc::new(HttpRemote::from_config(&config)?)
    } else {
        Arc::new(MemoryRemote::new())
    };

    let store = Arc::new(LocalStore::open(medium.clone()));
    let queue = Arc::new(OfflineQueue::open(medium, config.backoff()));
    let coordinator = Arc::new(SyncCoordinator::new(store.clone(), queue, remote, config.app().clone()));

    for entity_type in [EntityType::Property, EntityType::CheckIn] {
        store.subscribe_fn(entity_type, |event| {
            println!("  {} {} '{}'", event.operation(), event.entity_type(), event.id());
            Ok::<(), HandlerError>(())
        });
    }

    let monitor = NetworkMonitor::default();
    let service = SyncService::start(coordinator.clone(), &monitor);

    println!("Offline: capturing a viewing");
    let property = coordinator
        .create(
            EntityType::Property,
            json!({"title": "Harbour loft", "city": "Lisbon", "listing_price": 485000}),
        )
        .await?;
    coordinator
        .create(
            EntityType::CheckIn,
            json!({"agent": "agent-7", "property": property.entity.id, "lat": 38.707, "lng": -9.136}),
        )
        .await?;
    let mut changes = serde_json::Map::new();
    changes.insert("status".to_string(), json!("viewing booked"));
    coordinator
        .update(EntityType::Property, &property.entity.id, changes)
        .await?;
    println!("Status: {}", coordinator.status());

    println!("Back online");
    let mut status = coordinator.subscribe_status();
    monitor.set_online(true);
    let synced = tokio::time::timeout(
        Duration::from_secs(30),
        status.wait_for(|s| s.phase == SyncPhase::OnlineIdle && s.pending == 0),
    )
    .await
    .is_ok_and(|reached| reached.is_ok());
    if synced {
        println!("Status: {}", coordinator.status());
    } else {
        println!("Still syncing: {}", coordinator.status());
    }

    let metrics = coordinator.metrics();
    println!(
        "Confirmed {} queued actions, {} direct writes, {} retries",
        metrics.actions_confirmed, metrics.direct_writes, metrics.actions_retried
    );

    for entity_type in [EntityType::Property, EntityType::CheckIn] {
        println!("{}:", entity_type.collection());
        for entity in store.list(entity_type).iter() {
            println!("  {} [{}] {}", entity.id, entity.sync_state.as_str(), entity.to_record());
        }
    }

    service.stop().await;
    Ok(())
}
