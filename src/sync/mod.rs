//! # Synchronization Coordinator
//!
//! Decides whether the local store or the remote backend is authoritative at
//! a given moment, routes write commands accordingly, drains the offline queue
//! and reconciles pulled data with last-writer-wins.
//!
//! ## Architecture
//!
//! The coordinator ties together:
//! - **Local Store**: optimistic apply of every write, the only state the UI reads
//! - **Offline Queue**: unconfirmed writes, replayed through this coordinator
//! - **Remote Adapter**: the backend, called with a per-call timeout
//! - **Sync State**: `Offline → OnlineSyncing → OnlineIdle` phase machine
//! - **Conflict Resolver**: last-writer-wins on pull
//! - **Network Monitor / Background Service**: react to connectivity changes
//!   and retry deadlines without polling
//! - **Metrics**: counters for the status screen
//!
//! ## Write routing
//!
//! | phase           | write                                           |
//! |-----------------|-------------------------------------------------|
//! | `Offline`       | apply locally, enqueue                          |
//! | `OnlineSyncing` | apply locally, enqueue                          |
//! | `OnlineIdle`    | apply locally, call the backend directly        |
//!
//! A direct call that fails transiently falls back to the queue. A record
//! with queued or in-flight work always goes through the queue, so the
//! backend sees its changes in submission order.
//!
//! Commands never fail because of the backend: sync problems are reported in
//! the returned `WriteOutcome` and in the published `SyncStatus`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use estate_sync::local_db::LocalStore;
//! use estate_sync::offline::OfflineQueue;
//! use estate_sync::remote::MemoryRemote;
//! use estate_sync::shared::{AppConfig, EntityType};
//! use estate_sync::sync::SyncCoordinator;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), estate_sync::shared::CommandError> {
//! let coordinator = SyncCoordinator::new(
//!     Arc::new(LocalStore::in_memory()),
//!     Arc::new(OfflineQueue::in_memory()),
//!     Arc::new(MemoryRemote::new()),
//!     AppConfig::default(),
//! );
//!
//! coordinator.create(EntityType::Property, json!({"title": "Harbour loft"})).await?;
//! println!("{}", coordinator.status());
//!
//! coordinator.connectivity_restored().await;
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod conflict_resolver;
pub mod metrics;
pub mod network_monitor;
pub mod sync_state;

pub use background::SyncService;
pub use conflict_resolver::Resolution;
pub use metrics::SyncMetrics;
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use sync_state::{SyncPhase, SyncStatus};

use crate::local_db::LocalStore;
use crate::offline::{ActionExecutor, DrainResult, OfflineQueue, QueueOperation, QueuedAction, RejectedAction};
use crate::remote::RemoteAdapter;
use crate::schema::{canonical_key, normalize, ID_ALIASES};
use crate::shared::config::AppConfig;
use crate::shared::entity::{next_timestamp, now_millis, Entity, EntityType, SyncState};
use crate::shared::error::{CommandError, RemoteError};
use async_trait::async_trait;
use conflict_resolver::{is_remotely_deleted, resolve};
use futures_util::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

/// How a write reached the backend
#[derive(Debug, Clone, PartialEq)]
pub enum WriteDelivery {
    /// The backend confirmed the write
    Confirmed,
    /// The write waits in the offline queue
    Queued,
    /// The backend refused the write; the entity is marked `conflict`
    Rejected(RemoteError),
}

/// Result of a write command
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Entity as applied locally (for deletes, the removed entity)
    pub entity: Entity,
    /// Remote delivery state
    pub delivery: WriteDelivery,
}

impl WriteOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.delivery == WriteDelivery::Confirmed
    }

    pub fn is_queued(&self) -> bool {
        self.delivery == WriteDelivery::Queued
    }
}

/// Effect of one pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Remote entities unknown locally, inserted as synced
    pub inserted: usize,
    /// Local entities overwritten by a newer remote version
    pub updated: usize,
    /// Local entities as new or newer than the remote version
    pub kept: usize,
    /// Synced local entities the backend no longer has
    pub removed: usize,
    /// Collections whose fetch failed
    pub failed: Vec<EntityType>,
}

impl PullReport {
    fn absorb(&mut self, other: PullReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.kept += other.kept;
        self.removed += other.removed;
        self.failed.extend(other.failed);
    }
}

#[derive(Debug)]
struct CoordinatorState {
    phase: SyncPhase,
    cancel: CancellationToken,
    auth_required: bool,
    last_sync_at: Option<i64>,
}

enum Route<'a> {
    Queue,
    Direct(DirectWrite<'a>),
}

/// Marks a record as having a direct backend call in flight
///
/// Drains skip the record meanwhile; dropping the marker wakes the
/// background service if work was queued behind the call.
struct DirectWrite<'a> {
    coordinator: &'a SyncCoordinator,
    key: (EntityType, String),
}

impl Drop for DirectWrite<'_> {
    fn drop(&mut self) {
        self.coordinator
            .direct
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        if self.coordinator.queue.has_pending(self.key.0, &self.key.1) {
            self.coordinator.work_queued.notify_one();
        }
    }
}

/// Orchestrates the local store, offline queue and remote adapter
pub struct SyncCoordinator {
    store: Arc<LocalStore>,
    queue: Arc<OfflineQueue>,
    remote: Arc<dyn RemoteAdapter>,
    config: AppConfig,
    state: Mutex<CoordinatorState>,
    direct: Mutex<HashSet<(EntityType, String)>>,
    status_tx: watch::Sender<SyncStatus>,
    metrics: Mutex<SyncMetrics>,
    work_queued: Notify,
}

impl SyncCoordinator {
    /// Coordinator starting in `Offline`
    pub fn new(
        store: Arc<LocalStore>,
        queue: Arc<OfflineQueue>,
        remote: Arc<dyn RemoteAdapter>,
        config: AppConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::default());
        let coordinator = Self {
            store,
            queue,
            remote,
            config,
            state: Mutex::new(CoordinatorState {
                phase: SyncPhase::Offline,
                cancel: CancellationToken::new(),
                auth_required: false,
                last_sync_at: None,
            }),
            direct: Mutex::new(HashSet::new()),
            status_tx,
            metrics: Mutex::new(SyncMetrics::new()),
            work_queued: Notify::new(),
        };
        coordinator.queue_stranded_records();
        coordinator.publish_status();
        coordinator
    }

    /// Queue records left `pending-upload` with no action to deliver them
    ///
    /// The local write and the enqueue are persisted separately, and a direct
    /// call has no queue entry at all; a session that stopped in between
    /// leaves such records behind. They are queued as creates, which the
    /// backend applies as upserts.
    fn queue_stranded_records(&self) -> usize {
        let rejected: HashSet<(EntityType, String)> = self
            .queue
            .rejected()
            .into_iter()
            .map(|r| (r.action.entity_type, r.action.id))
            .collect();
        let mut queued = 0;
        for entity_type in EntityType::ALL {
            let pending = self
                .store
                .list_where(entity_type, |e| e.sync_state == SyncState::PendingUpload);
            for entity in pending.iter() {
                if self.queue.has_pending(entity_type, &entity.id)
                    || rejected.contains(&(entity_type, entity.id.clone()))
                {
                    continue;
                }
                self.queue.enqueue(QueuedAction::new(
                    entity_type,
                    QueueOperation::Create,
                    entity.id.clone(),
                    entity.to_remote_record(),
                ));
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::warn!("[Sync] queued {} unsynced records that had no pending action", queued);
        }
        queued
    }

    /// Local store written by this coordinator
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Offline queue drained by this coordinator
    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current phase
    pub fn phase(&self) -> SyncPhase {
        self.lock_state().phase
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> SyncMetrics {
        self.lock_metrics().clone()
    }

    // ------------------------------------------------------------------
    // Write commands
    // ------------------------------------------------------------------

    /// Create an entity from a raw record; an id is generated if missing
    pub async fn create(&self, entity_type: EntityType, record: Value) -> Result<WriteOutcome, CommandError> {
        let mut record = record;
        if let Value::Object(fields) = &mut record {
            let has_id = std::iter::once("id")
                .chain(ID_ALIASES.iter().copied())
                .any(|key| fields.get(key).is_some_and(|v| !v.is_null()));
            if !has_id {
                fields.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
        }

        let mut entity = normalize(entity_type, &record)?;
        if self.store.contains(entity_type, &entity.id) {
            return Err(CommandError::AlreadyExists {
                entity_type,
                id: entity.id,
            });
        }
        let floor = self.store.last_updated_at(entity_type, &entity.id).unwrap_or(0);
        if entity.updated_at <= floor {
            entity.updated_at = next_timestamp(floor);
        }
        entity.sync_state = SyncState::PendingUpload;
        let stored = self.store.put(entity);
        let action = QueuedAction::new(entity_type, QueueOperation::Create, stored.id.clone(), stored.to_remote_record());

        let outcome = match self.route(entity_type, &stored.id) {
            Route::Queue => self.enqueue_write(action, stored),
            Route::Direct(guard) => {
                let result = self.call(self.remote.create(entity_type, &stored)).await;
                let outcome = match result {
                    Ok(remote) => {
                        self.lock_metrics().direct_writes += 1;
                        let confirmed = if remote.id != stored.id {
                            self.adopt_server_id(entity_type, &stored.id, remote, 0)
                        } else {
                            self.settle(entity_type, &stored.id, Some(remote), 0)
                        };
                        WriteOutcome {
                            entity: confirmed.unwrap_or(stored),
                            delivery: WriteDelivery::Confirmed,
                        }
                    }
                    Err(error) => self.direct_failed(action, stored, error),
                };
                drop(guard);
                outcome
            }
        };
        self.publish_status();
        Ok(outcome)
    }

    /// Change fields of an entity; keys may use any alias the normalizer knows
    pub async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<WriteOutcome, CommandError> {
        let local = self
            .store
            .get(entity_type, id)
            .ok_or_else(|| CommandError::not_found(entity_type, id))?;

        let mut record = match local.to_record() {
            Value::Object(record) => record,
            _ => Map::new(),
        };
        for (key, value) in changes {
            let key = canonical_key(entity_type, &key);
            if matches!(key.as_str(), "id" | "updatedAt" | "syncState") {
                continue;
            }
            record.insert(key, value);
        }

        let mut updated = normalize(entity_type, &Value::Object(record))?;
        let floor = local
            .updated_at
            .max(self.store.last_updated_at(entity_type, id).unwrap_or(0));
        updated.updated_at = next_timestamp(floor);
        updated.sync_state = SyncState::PendingUpload;

        let mut payload: Map<String, Value> = updated
            .fields
            .iter()
            .filter(|(key, value)| local.fields.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        payload.insert("updatedAt".to_string(), Value::from(updated.updated_at));

        let stored = self.store.put(updated);
        let action = QueuedAction::new(
            entity_type,
            QueueOperation::Update,
            id,
            Value::Object(payload.clone()),
        );

        let outcome = match self.route(entity_type, id) {
            Route::Queue => self.enqueue_write(action, stored),
            Route::Direct(guard) => {
                let result = self.call(self.remote.update(entity_type, id, &payload)).await;
                let outcome = match result {
                    Ok(remote) => {
                        self.lock_metrics().direct_writes += 1;
                        WriteOutcome {
                            entity: self.settle(entity_type, id, Some(remote), 0).unwrap_or(stored),
                            delivery: WriteDelivery::Confirmed,
                        }
                    }
                    Err(error) => self.direct_failed(action, stored, error),
                };
                drop(guard);
                outcome
            }
        };
        self.publish_status();
        Ok(outcome)
    }

    /// Delete an entity
    ///
    /// Offline the entity disappears at once. In `OnlineIdle` it is removed
    /// once the backend acknowledged the delete, or when the delete falls
    /// back to the queue.
    pub async fn delete(&self, entity_type: EntityType, id: &str) -> Result<WriteOutcome, CommandError> {
        let local = self
            .store
            .get(entity_type, id)
            .ok_or_else(|| CommandError::not_found(entity_type, id))?;
        let action = QueuedAction::new(entity_type, QueueOperation::Delete, id, Value::Null);

        let outcome = match self.route(entity_type, id) {
            Route::Queue => {
                let removed = self.store.remove(entity_type, id).unwrap_or(local);
                self.enqueue_write(action, removed)
            }
            Route::Direct(guard) => {
                let result = self.call(self.remote.delete(entity_type, id)).await;
                let outcome = match result {
                    Ok(()) => {
                        self.lock_metrics().direct_writes += 1;
                        WriteOutcome {
                            entity: self.store.remove(entity_type, id).unwrap_or(local),
                            delivery: WriteDelivery::Confirmed,
                        }
                    }
                    Err(error) if !matches!(error, RemoteError::Validation { .. }) => {
                        let removed = self.store.remove(entity_type, id).unwrap_or(local);
                        self.direct_failed(action, removed, error)
                    }
                    Err(error) => self.direct_failed(action, local, error),
                };
                drop(guard);
                outcome
            }
        };
        self.publish_status();
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Connectivity and draining
    // ------------------------------------------------------------------

    /// Connectivity came back: drain the queue, then pull if configured
    pub async fn connectivity_restored(&self) -> DrainResult {
        self.transition(&[SyncPhase::Offline], SyncPhase::OnlineSyncing);
        let result = self.sync_now().await;
        if self.config.pull_on_reconnect && !result.cancelled && self.phase().is_online() {
            let report = self.pull_all().await;
            tracing::info!(
                "[Sync] pull: {} inserted, {} updated, {} removed, {} failed collections",
                report.inserted,
                report.updated,
                report.removed,
                report.failed.len()
            );
        }
        result
    }

    /// Connectivity lost: go offline and cancel the running drain
    pub fn connectivity_lost(&self) {
        self.transition(&[SyncPhase::OnlineSyncing, SyncPhase::OnlineIdle], SyncPhase::Offline);
    }

    /// Drain the queue now; does nothing while offline
    pub async fn sync_now(&self) -> DrainResult {
        let cancel = {
            let state = self.lock_state();
            (state.phase.is_online()).then(|| state.cancel.clone())
        };
        let Some(cancel) = cancel else {
            return DrainResult {
                remaining: self.queue.len(),
                next_attempt_at: self.queue.next_attempt_at(),
                ..DrainResult::default()
            };
        };

        if !self.queue.is_empty() {
            self.transition(&[SyncPhase::OnlineIdle], SyncPhase::OnlineSyncing);
        }
        self.lock_metrics().record_sync_start();

        let result = self.queue.drain(self, &cancel).await;

        {
            let mut metrics = self.lock_metrics();
            if result.cancelled {
                metrics.record_sync_failure(result.confirmed.len());
            } else {
                metrics.record_sync_success(result.confirmed.len(), result.retried, result.rejected.len());
            }
        }
        if !result.cancelled {
            self.lock_state().last_sync_at = Some(now_millis());
            if result.is_empty() {
                self.transition(&[SyncPhase::OnlineSyncing], SyncPhase::OnlineIdle);
            }
        }
        tracing::debug!(
            "[Sync] drain: {} confirmed, {} retried, {} rejected, {} remaining",
            result.confirmed.len(),
            result.retried,
            result.rejected.len(),
            result.remaining
        );
        self.publish_status();
        result
    }

    /// Credentials were renewed: release held actions and drain
    pub async fn reauthenticated(&self) -> DrainResult {
        let released = self.queue.release_auth_holds();
        self.lock_state().auth_required = false;
        tracing::info!("[Sync] re-authenticated, {} held actions released", released);
        self.publish_status();
        self.sync_now().await
    }

    /// Time until the earliest retry deadline, if any
    pub fn next_retry_delay(&self) -> Option<Duration> {
        self.queue.next_attempt_at().map(|due| {
            let wait = due.saturating_sub(now_millis()).max(0);
            Duration::from_millis(wait as u64)
        })
    }

    // ------------------------------------------------------------------
    // Pull and conflict resolution
    // ------------------------------------------------------------------

    /// Pull every configured collection
    pub async fn pull_all(&self) -> PullReport {
        let types = self.config.pull_entity_types.clone();
        let results = join_all(types.iter().map(|entity_type| self.refresh(*entity_type))).await;

        let mut total = PullReport::default();
        for (entity_type, result) in types.into_iter().zip(results) {
            match result {
                Ok(report) => total.absorb(report),
                Err(e) => {
                    tracing::warn!("[Sync] pull of {} failed: {}", entity_type, e);
                    total.failed.push(entity_type);
                }
            }
        }
        total
    }

    /// Fetch one collection and reconcile it with last-writer-wins
    pub async fn refresh(&self, entity_type: EntityType) -> Result<PullReport, RemoteError> {
        let remote_entities = self.call(self.remote.fetch_all(entity_type)).await;
        if let Err(RemoteError::Auth { .. }) = &remote_entities {
            self.set_auth_required();
        }
        let report = self.reconcile(entity_type, remote_entities?);
        self.publish_status();
        Ok(report)
    }

    fn reconcile(&self, entity_type: EntityType, remote_entities: Vec<Entity>) -> PullReport {
        let mut report = PullReport::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(remote_entities.len());

        for remote in remote_entities {
            seen.insert(remote.id.clone());
            let local = self.store.get(entity_type, &remote.id);
            match resolve(local.as_ref(), &remote) {
                conflict_resolver::Resolution::Insert => {
                    // A queued delete for this id must not be undone by the pull
                    if self.has_local_work(entity_type, &remote.id) {
                        report.kept += 1;
                        continue;
                    }
                    self.store.put(remote.with_sync_state(SyncState::Synced));
                    report.inserted += 1;
                }
                conflict_resolver::Resolution::TakeRemote => {
                    let discarded = self.queue.discard_for(entity_type, &remote.id);
                    if discarded > 0 {
                        tracing::info!(
                            "[Sync] newer remote {} '{}' superseded {} queued actions",
                            entity_type,
                            remote.id,
                            discarded
                        );
                    }
                    self.store.put(remote.with_sync_state(SyncState::Synced));
                    self.lock_metrics().remote_wins += 1;
                    report.updated += 1;
                }
                conflict_resolver::Resolution::KeepLocal => report.kept += 1,
            }
        }

        for local in self.store.list(entity_type).iter() {
            if seen.contains(&local.id) {
                continue;
            }
            if is_remotely_deleted(local, self.has_local_work(entity_type, &local.id)) {
                self.store.remove(entity_type, &local.id);
                report.removed += 1;
            }
        }
        report
    }

    // ------------------------------------------------------------------
    // Rejected actions and status
    // ------------------------------------------------------------------

    /// Changes the backend refused
    pub fn rejected(&self) -> Vec<RejectedAction> {
        self.queue.rejected()
    }

    /// Queue a rejected change again, optionally with a corrected payload
    pub fn retry_rejected(&self, seq: u64, payload: Option<Value>) -> Option<u64> {
        let rejected = self.queue.rejected().into_iter().find(|r| r.action.seq == seq)?;
        let queued = self.queue.retry_rejected(seq, payload)?;
        self.store
            .mark_sync_state(rejected.action.entity_type, &rejected.action.id, SyncState::PendingUpload);
        if self.transition(&[SyncPhase::OnlineIdle], SyncPhase::OnlineSyncing) || self.phase().is_online() {
            self.work_queued.notify_one();
        }
        self.publish_status();
        Some(queued)
    }

    /// Drop a rejected change; the local entity keeps its `conflict` state
    pub fn discard_rejected(&self, seq: u64) -> Option<RejectedAction> {
        let discarded = self.queue.discard_rejected(seq);
        self.publish_status();
        discarded
    }

    /// Current status
    pub fn status(&self) -> SyncStatus {
        let stats = self.queue.stats();
        let persistence_degraded = self.store.is_degraded() || self.queue.degradation().is_some();
        let state = self.lock_state();
        SyncStatus {
            phase: state.phase,
            pending: stats.pending,
            rejected: stats.rejected,
            held: stats.held,
            auth_required: state.auth_required,
            last_sync_at: state.last_sync_at,
            persistence_degraded,
        }
    }

    /// Receiver of every status change
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn work_signal(&self) -> &Notify {
        &self.work_queued
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_metrics(&self) -> MutexGuard<'_, SyncMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Move to `to` if the current phase is one of `from`
    fn transition(&self, from: &[SyncPhase], to: SyncPhase) -> bool {
        let changed = {
            let mut state = self.lock_state();
            if from.contains(&state.phase) && state.phase.can_transition_to(to) {
                tracing::info!("[Sync] {} -> {}", state.phase, to);
                match to {
                    SyncPhase::Offline => state.cancel.cancel(),
                    SyncPhase::OnlineSyncing if state.phase == SyncPhase::Offline => {
                        state.cancel = CancellationToken::new();
                    }
                    _ => {}
                }
                state.phase = to;
                true
            } else {
                false
            }
        };
        if changed {
            self.publish_status();
        }
        changed
    }

    fn set_auth_required(&self) {
        let mut state = self.lock_state();
        if !state.auth_required {
            tracing::warn!("[Sync] backend requires re-authentication");
            state.auth_required = true;
        }
    }

    fn has_direct_write(&self, entity_type: EntityType, id: &str) -> bool {
        self.direct
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(entity_type, id.to_string()))
    }

    fn has_local_work(&self, entity_type: EntityType, id: &str) -> bool {
        self.queue.has_pending(entity_type, id) || self.has_direct_write(entity_type, id)
    }

    fn route(&self, entity_type: EntityType, id: &str) -> Route<'_> {
        if self.phase() != SyncPhase::OnlineIdle || self.queue.has_pending(entity_type, id) {
            return Route::Queue;
        }
        let key = (entity_type, id.to_string());
        let mut direct = self.direct.lock().unwrap_or_else(PoisonError::into_inner);
        if !direct.insert(key.clone()) {
            return Route::Queue;
        }
        drop(direct);
        Route::Direct(DirectWrite { coordinator: self, key })
    }

    async fn call<T, F>(&self, request: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout {
                millis: timeout.as_millis() as u64,
            }),
        }
    }

    fn enqueue_write(&self, action: QueuedAction, entity: Entity) -> WriteOutcome {
        self.queue.enqueue(action);
        self.queued(entity)
    }

    fn queued(&self, entity: Entity) -> WriteOutcome {
        self.transition(&[SyncPhase::OnlineIdle], SyncPhase::OnlineSyncing);
        if self.phase().is_online() {
            self.work_queued.notify_one();
        }
        WriteOutcome {
            entity,
            delivery: WriteDelivery::Queued,
        }
    }

    fn direct_failed(&self, action: QueuedAction, entity: Entity, error: RemoteError) -> WriteOutcome {
        match error {
            RemoteError::Network { .. } | RemoteError::Timeout { .. } => {
                tracing::info!("[Sync] direct write failed ({}), queued", error);
                self.lock_metrics().fallbacks += 1;
                self.queue.requeue(action);
                self.queued(entity)
            }
            RemoteError::Auth { ref message } => {
                self.set_auth_required();
                self.queue.requeue(action.held(message.clone()));
                self.queued(entity)
            }
            RemoteError::Validation {
                ref message,
                ref payload,
            } => {
                tracing::warn!("[Sync] {} '{}' rejected: {}", entity.entity_type, entity.id, message);
                self.lock_metrics().actions_rejected += 1;
                self.queue.reject(action, message.clone(), payload.clone());
                let marked = self
                    .store
                    .mark_sync_state(entity.entity_type, &entity.id, SyncState::Conflict)
                    .unwrap_or(entity);
                WriteOutcome {
                    entity: marked,
                    delivery: WriteDelivery::Rejected(error),
                }
            }
        }
    }

    /// Apply a backend confirmation to the local entity
    ///
    /// `own_entries` is the number of queue entries belonging to the call
    /// being confirmed (1 while a drain replays it, 0 for direct calls).
    fn settle(
        &self,
        entity_type: EntityType,
        id: &str,
        remote: Option<Entity>,
        own_entries: usize,
    ) -> Option<Entity> {
        let local = self.store.get(entity_type, id)?;
        if self.queue.pending_count_for(entity_type, id) > own_entries {
            return Some(local);
        }
        match remote {
            Some(remote) if remote.updated_at > local.updated_at => {
                Some(self.store.put(remote.with_sync_state(SyncState::Synced)))
            }
            _ => self.store.mark_sync_state(entity_type, id, SyncState::Synced),
        }
    }

    /// Move a record created under a client id to the id the backend assigned
    fn adopt_server_id(
        &self,
        entity_type: EntityType,
        local_id: &str,
        remote: Entity,
        own_entries: usize,
    ) -> Option<Entity> {
        self.queue.rekey(entity_type, local_id, &remote.id);
        let local = self.store.get(entity_type, local_id)?;
        let more_pending = self.queue.pending_count_for(entity_type, &remote.id) > own_entries;

        let mut adopted = if remote.updated_at > local.updated_at {
            remote
        } else {
            Entity {
                id: remote.id,
                ..local
            }
        };
        adopted.sync_state = if more_pending {
            SyncState::PendingUpload
        } else {
            SyncState::Synced
        };
        Some(self.store.rekey(local_id, adopted))
    }
}

/// Replays queued actions against the remote adapter
#[async_trait]
impl ActionExecutor for SyncCoordinator {
    async fn execute(&self, action: &QueuedAction) -> Result<(), RemoteError> {
        let entity_type = action.entity_type;
        let result = match action.operation {
            QueueOperation::Create => {
                let entity = normalize(entity_type, &action.payload)
                    .map_err(|e| RemoteError::validation(e.to_string(), action.payload.clone()))?;
                self.call(self.remote.create(entity_type, &entity)).await.map(|remote| {
                    if remote.id != action.id {
                        self.adopt_server_id(entity_type, &action.id, remote, 1);
                    } else {
                        self.settle(entity_type, &action.id, Some(remote), 1);
                    }
                })
            }
            QueueOperation::Update => {
                let partial = action.payload.as_object().cloned().unwrap_or_default();
                self.call(self.remote.update(entity_type, &action.id, &partial))
                    .await
                    .map(|remote| {
                        self.settle(entity_type, &action.id, Some(remote), 1);
                    })
            }
            QueueOperation::Delete => self.call(self.remote.delete(entity_type, &action.id)).await,
        };

        match &result {
            Err(RemoteError::Auth { .. }) => self.set_auth_required(),
            Err(RemoteError::Validation { .. }) => {
                self.store
                    .mark_sync_state(entity_type, &action.id, SyncState::Conflict);
            }
            _ => {}
        }
        result
    }

    fn is_busy(&self, entity_type: EntityType, id: &str) -> bool {
        self.has_direct_write(entity_type, id)
    }
}

impl fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("status", &self.status())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
