//! In-Process Remote Adapter
//!
//! Backend living in memory, used by tests and by the demo binary when no
//! server is configured. It records every call, can fail the next calls with
//! scripted errors, can be made unreachable, and optionally assigns its own
//! ids on create.
//!
//! Creates are idempotent by id, so replaying a confirmed create is harmless.

use super::RemoteAdapter;
use crate::local_db::collection::Collection;
use crate::shared::entity::{Entity, EntityType, SyncState};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Kind of remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    /// `fetch_all`
    FetchAll,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
}

/// One call received by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    /// Kind of call
    pub operation: RemoteOperation,
    /// Collection addressed
    pub entity_type: EntityType,
    /// Record id; empty for `FetchAll`
    pub id: String,
    /// Record (create), changed fields (update) or `Null`
    pub payload: Value,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<EntityType, Collection>,
    calls: Vec<RemoteCall>,
    failures: VecDeque<RemoteError>,
    unreachable: bool,
    assign_ids: bool,
    next_id: u64,
    latency: Option<Duration>,
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    /// Empty backend that keeps client ids
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty backend that replaces client ids with `srv-N` on create
    pub fn with_server_ids() -> Self {
        let remote = Self::default();
        remote.lock().assign_ids = true;
        remote
    }

    /// Seed a record without recording a call
    pub fn insert(&self, entity: Entity) {
        let entity = entity.with_sync_state(SyncState::Synced);
        self.lock()
            .collections
            .entry(entity.entity_type)
            .or_default()
            .upsert(entity);
    }

    /// Record held by the backend
    pub fn get(&self, entity_type: EntityType, id: &str) -> Option<Entity> {
        self.lock()
            .collections
            .get(&entity_type)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// Every record of a collection, in insertion order
    pub fn records(&self, entity_type: EntityType) -> Vec<Entity> {
        self.lock()
            .collections
            .get(&entity_type)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fail the next call with `error`; scripted failures are used in order
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().failures.push_back(error);
    }

    /// Fail every call with a network error until switched back
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Calls received so far, failed ones included
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Calls of one kind
    pub fn calls_of(&self, operation: RemoteOperation) -> Vec<RemoteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, wait out the latency, then apply scripted failures
    async fn begin(
        &self,
        operation: RemoteOperation,
        entity_type: EntityType,
        id: &str,
        payload: Value,
    ) -> Result<(), RemoteError> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(RemoteCall {
                operation,
                entity_type,
                id: id.to_string(),
                payload,
            });
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if state.unreachable {
            return Err(RemoteError::network("backend unreachable"));
        }
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteAdapter for MemoryRemote {
    async fn fetch_all(&self, entity_type: EntityType) -> Result<Vec<Entity>, RemoteError> {
        self.begin(RemoteOperation::FetchAll, entity_type, "", Value::Null)
            .await?;
        Ok(self.records(entity_type))
    }

    async fn create(&self, entity_type: EntityType, entity: &Entity) -> Result<Entity, RemoteError> {
        self.begin(RemoteOperation::Create, entity_type, &entity.id, entity.to_remote_record())
            .await?;

        let mut state = self.lock();
        let mut stored = entity.clone().with_sync_state(SyncState::Synced);
        stored.entity_type = entity_type;
        if state.assign_ids {
            state.next_id += 1;
            stored.id = format!("srv-{}", state.next_id);
        }
        state
            .collections
            .entry(entity_type)
            .or_default()
            .upsert(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        partial: &Map<String, Value>,
    ) -> Result<Entity, RemoteError> {
        self.begin(RemoteOperation::Update, entity_type, id, Value::Object(partial.clone()))
            .await?;

        let mut state = self.lock();
        let Some(mut stored) = state
            .collections
            .get(&entity_type)
            .and_then(|c| c.get(id))
            .cloned()
        else {
            return Err(RemoteError::validation(
                format!("{} '{}' does not exist", entity_type, id),
                Value::Object(partial.clone()),
            ));
        };

        for (key, value) in partial {
            match key.as_str() {
                "id" | "syncState" => {}
                "updatedAt" => {
                    if let Some(millis) = value.as_i64() {
                        stored.updated_at = millis;
                    }
                }
                _ => {
                    stored.fields.insert(key.clone(), value.clone());
                }
            }
        }
        state
            .collections
            .entry(entity_type)
            .or_default()
            .upsert(stored.clone());
        Ok(stored)
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        self.begin(RemoteOperation::Delete, entity_type, id, Value::Null)
            .await?;
        if let Some(collection) = self.lock().collections.get_mut(&entity_type) {
            collection.remove(id);
        }
        Ok(())
    }
}
