//! # Local Entity Store
//!
//! The single source of truth for every UI read. One insertion-ordered
//! collection per entity type, held in memory and mirrored to a device-local
//! [`StorageMedium`] on every mutation.
//!
//! ## Architecture
//!
//! - **Collections**: `id → Entity`, iteration in insertion order
//! - **Persistence**: each collection is written as one JSON document on
//!   every `put`/`remove` and loaded through the normalizer on `open`
//! - **Notification**: every applied mutation is published on the store's
//!   [`ChangeBus`] after it was applied and persisted
//! - **Degraded mode**: if the medium fails or holds corrupted data, the store
//!   keeps working memory-only for the rest of the session
//!
//! ## Key Components
//!
//! - `medium.rs`: `StorageMedium` trait, file and memory media
//! - `collection.rs`: ordered collection and `EntityList` snapshots
//! - `schema.rs`: storage keys and the persisted envelope
//!
//! ## Usage
//!
//! ```rust
//! use estate_sync::local_db::LocalStore;
//! use estate_sync::schema::normalize;
//! use estate_sync::shared::EntityType;
//! use serde_json::json;
//!
//! let store = LocalStore::in_memory();
//! let entity = normalize(EntityType::Property, &json!({"id": "p1", "title": "A"})).unwrap();
//! store.put(entity);
//! assert_eq!(store.list(EntityType::Property).len(), 1);
//! ```

pub(crate) mod collection;
pub mod medium;
pub mod schema;

pub use collection::EntityList;
pub use medium::{FileMedium, MemoryMedium, StorageMedium};

use crate::realtime::{ChangeBus, SubscriptionHandle};
use crate::schema::normalize;
use crate::shared::entity::{Entity, EntityType, SyncState};
use crate::shared::error::{HandlerError, MediumError, PersistenceDegraded};
use crate::shared::event::ChangeEvent;
use collection::Collection;
use schema::{collection_key, is_supported, PersistedCollection};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<EntityType, Collection>,
    /// Highest `updatedAt` ever stored per id, kept after removal
    watermarks: HashMap<(EntityType, String), i64>,
    degraded: Option<PersistenceDegraded>,
}

/// Device-local entity store
#[derive(Debug)]
pub struct LocalStore {
    state: RwLock<StoreState>,
    outbox: Mutex<VecDeque<ChangeEvent>>,
    dispatching: AtomicBool,
    bus: ChangeBus,
    medium: Arc<dyn StorageMedium>,
}

impl LocalStore {
    /// Open the store, loading every persisted collection from `medium`
    ///
    /// Never fails: an unreadable or corrupted medium puts the store in
    /// degraded (memory-only) mode.
    pub fn open(medium: Arc<dyn StorageMedium>) -> Self {
        let mut state = StoreState::default();

        for entity_type in EntityType::ALL {
            match load_collection(medium.as_ref(), entity_type) {
                Ok(entities) => {
                    let collection = state.collections.entry(entity_type).or_default();
                    for entity in entities {
                        state
                            .watermarks
                            .insert((entity_type, entity.id.clone()), entity.updated_at);
                        collection.upsert(entity);
                    }
                }
                // Later collections still load; degraded mode stops any overwrite
                Err(reason) => degrade(&mut state, reason),
            }
        }

        let loaded: usize = state.collections.values().map(Collection::len).sum();
        tracing::info!(
            "[Store] opened with {} entities{}",
            loaded,
            if state.degraded.is_some() { " (memory-only)" } else { "" }
        );

        Self {
            state: RwLock::new(state),
            outbox: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
            bus: ChangeBus::new(),
            medium,
        }
    }

    /// Store backed by a fresh in-process medium
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryMedium::new()))
    }

    /// Entity by id
    pub fn get(&self, entity_type: EntityType, id: &str) -> Option<Entity> {
        self.read_state()
            .collections
            .get(&entity_type)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// Whether the collection holds `id`
    pub fn contains(&self, entity_type: EntityType, id: &str) -> bool {
        self.read_state()
            .collections
            .get(&entity_type)
            .is_some_and(|c| c.contains(id))
    }

    /// Number of entities in a collection
    pub fn len(&self, entity_type: EntityType) -> usize {
        self.read_state()
            .collections
            .get(&entity_type)
            .map_or(0, Collection::len)
    }

    /// Snapshot of a collection in insertion order
    pub fn list(&self, entity_type: EntityType) -> EntityList {
        self.list_where(entity_type, |_| true)
    }

    /// Snapshot of the entities matching `predicate`
    pub fn list_where<P>(&self, entity_type: EntityType, predicate: P) -> EntityList
    where
        P: Fn(&Entity) -> bool,
    {
        let state = self.read_state();
        let items = state
            .collections
            .get(&entity_type)
            .map(|c| c.iter().filter(|e| predicate(e)).cloned().collect())
            .unwrap_or_default();
        EntityList::new(items)
    }

    /// Highest `updatedAt` the store has held for `id`, even if since removed
    pub fn last_updated_at(&self, entity_type: EntityType, id: &str) -> Option<i64> {
        self.read_state()
            .watermarks
            .get(&(entity_type, id.to_string()))
            .copied()
    }

    /// Insert or replace an entity; returns the stored value
    ///
    /// `updatedAt` is raised to the highest value previously stored for the id,
    /// so it never goes backwards.
    pub fn put(&self, mut entity: Entity) -> Entity {
        {
            let mut state = self.write_state();
            let key = (entity.entity_type, entity.id.clone());
            if let Some(floor) = state.watermarks.get(&key).copied() {
                if entity.updated_at < floor {
                    tracing::debug!(
                        "[Store] clamping {} '{}' updatedAt {} -> {}",
                        entity.entity_type,
                        entity.id,
                        entity.updated_at,
                        floor
                    );
                    entity.updated_at = floor;
                }
            }
            state.watermarks.insert(key, entity.updated_at);

            let previous = state
                .collections
                .entry(entity.entity_type)
                .or_default()
                .upsert(entity.clone());
            self.persist(&mut state, entity.entity_type);

            let event = match previous {
                Some(_) => ChangeEvent::Updated(entity.clone()),
                None => ChangeEvent::Created(entity.clone()),
            };
            self.enqueue_event(event);
        }
        self.dispatch();
        entity
    }

    /// Remove an entity; returns the removed value
    pub fn remove(&self, entity_type: EntityType, id: &str) -> Option<Entity> {
        let removed = {
            let mut state = self.write_state();
            let removed = state.collections.get_mut(&entity_type)?.remove(id)?;
            self.persist(&mut state, entity_type);
            self.enqueue_event(ChangeEvent::Deleted(removed.clone()));
            removed
        };
        self.dispatch();
        Some(removed)
    }

    /// Replace `old_id` with `entity` (server-assigned id) in one step
    ///
    /// Publishes `Deleted` for the old id, then `Created` for the new one.
    pub fn rekey(&self, old_id: &str, entity: Entity) -> Entity {
        let entity_type = entity.entity_type;
        {
            let mut state = self.write_state();
            let collection = state.collections.entry(entity_type).or_default();
            if let Some(old) = collection.remove(old_id) {
                self.persist(&mut state, entity_type);
                self.enqueue_event(ChangeEvent::Deleted(old));
            }
        }
        self.dispatch();
        tracing::info!("[Store] {} '{}' re-keyed to '{}'", entity_type, old_id, entity.id);
        self.put(entity)
    }

    /// Change only the sync state of a stored entity
    pub fn mark_sync_state(&self, entity_type: EntityType, id: &str, sync_state: SyncState) -> Option<Entity> {
        let current = self.get(entity_type, id)?;
        if current.sync_state == sync_state {
            return Some(current);
        }
        Some(self.put(current.with_sync_state(sync_state)))
    }

    /// Bus on which every applied mutation is published
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Subscribe a closure to one entity type
    pub fn subscribe_fn<F>(&self, entity_type: EntityType, handler: F) -> SubscriptionHandle
    where
        F: Fn(&ChangeEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.bus.subscribe_fn(entity_type, handler)
    }

    /// Remove a subscription
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.bus.unsubscribe(handle)
    }

    /// Degradation notice, if the store fell back to memory-only
    pub fn degradation(&self) -> Option<PersistenceDegraded> {
        self.read_state().degraded.clone()
    }

    /// Whether the store runs memory-only
    pub fn is_degraded(&self) -> bool {
        self.read_state().degraded.is_some()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &mut RwLockWriteGuard<'_, StoreState>, entity_type: EntityType) {
        if state.degraded.is_some() {
            return;
        }
        let records = state
            .collections
            .get(&entity_type)
            .map(|c| c.iter().map(Entity::to_record).collect())
            .unwrap_or_default();
        let result = serde_json::to_vec(&PersistedCollection::new(records))
            .map_err(MediumError::from)
            .and_then(|bytes| self.medium.write(&collection_key(entity_type), &bytes));
        if let Err(e) = result {
            degrade(state, format!("failed to persist {}: {}", entity_type, e));
        }
    }

    fn enqueue_event(&self, event: ChangeEvent) {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }

    /// Deliver queued events in apply order
    ///
    /// Exactly one caller delivers at a time. A write issued from inside a
    /// handler lands in the outbox and is delivered after the current event's
    /// fan-out, by the caller already dispatching.
    fn dispatch(&self) {
        loop {
            if self
                .dispatching
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            loop {
                let next = self
                    .outbox
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(event) = next else { break };
                self.bus.publish(&event);
            }
            self.dispatching.store(false, Ordering::Release);

            // An event pushed between the last pop and the release would
            // otherwise wait for the next mutation.
            if self
                .outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
            {
                return;
            }
        }
    }
}

fn degrade(state: &mut StoreState, reason: String) {
    if state.degraded.is_none() {
        tracing::warn!("[Store] persistence degraded, continuing memory-only: {}", reason);
        state.degraded = Some(PersistenceDegraded::new(reason));
    }
}

fn load_collection(medium: &dyn StorageMedium, entity_type: EntityType) -> Result<Vec<Entity>, String> {
    let key = collection_key(entity_type);
    let Some(bytes) = medium
        .read(&key)
        .map_err(|e| format!("cannot read {}: {}", key, e))?
    else {
        return Ok(Vec::new());
    };
    let persisted: PersistedCollection =
        serde_json::from_slice(&bytes).map_err(|e| format!("corrupted {}: {}", key, e))?;
    if !is_supported(persisted.version) {
        return Err(format!("{} has unsupported version {}", key, persisted.version));
    }

    let mut entities = Vec::with_capacity(persisted.records.len());
    for record in &persisted.records {
        match normalize(entity_type, record) {
            Ok(entity) => entities.push(entity),
            Err(e) => tracing::warn!("[Store] skipping stored record: {}", e),
        }
    }
    Ok(entities)
}
