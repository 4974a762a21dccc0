//! # Offline Action Queue
//!
//! Records mutations that could not be confirmed by the backend yet and
//! replays them once connectivity returns.
//!
//! ## Features
//!
//! - **Persistent Queue**: actions survive app restarts (`offline_queue` key)
//! - **Collapsing**: repeated updates of one record merge into one entry, a
//!   delete discards everything still pending for the record
//! - **Ordered Replay**: FIFO, records replay in submission order
//! - **Failure Routing**: transient failures back off and retry forever, auth
//!   failures hold the entry, validation failures move it to a rejected list
//! - **Cancellation**: a drain stops at the next await when its token fires
//!
//! ## Usage
//!
//! ```rust,no_run
//! use estate_sync::offline::queue::{OfflineQueue, QueueOperation, QueuedAction};
//! use estate_sync::shared::EntityType;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(executor: impl estate_sync::offline::ActionExecutor) {
//! let queue = OfflineQueue::in_memory();
//! queue.enqueue(QueuedAction::new(
//!     EntityType::Contact,
//!     QueueOperation::Update,
//!     "c1",
//!     json!({"phone": "555-1"}),
//! ));
//!
//! let result = queue.drain(&executor, &CancellationToken::new()).await;
//! println!("{} confirmed, {} left", result.confirmed.len(), result.remaining);
//! # }
//! ```

use super::retry::BackoffStrategy;
use crate::local_db::medium::{MemoryMedium, StorageMedium};
use crate::local_db::schema::{is_supported, CURRENT_SCHEMA_VERSION, QUEUE_KEY};
use crate::shared::entity::{now_millis, EntityType};
use crate::shared::error::{MediumError, PersistenceDegraded, RemoteError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Kind of mutation carried by a queued action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueueOperation {
    /// Create the record remotely; payload is the full record
    Create,
    /// Patch the record remotely; payload holds the changed fields
    Update,
    /// Delete the record remotely; payload is ignored
    Delete,
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueOperation::Create => "create",
            QueueOperation::Update => "update",
            QueueOperation::Delete => "delete",
        })
    }
}

/// Mutation waiting for remote confirmation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    /// Position in submission order, assigned by `enqueue`
    pub seq: u64,
    /// Collection of the record
    pub entity_type: EntityType,
    /// Mutation kind
    pub operation: QueueOperation,
    /// Record id
    pub id: String,
    /// Record (create) or changed fields (update)
    pub payload: Value,
    /// Epoch millis when first queued
    pub enqueued_at: i64,
    /// Epoch millis of the last replay attempt
    pub attempted_at: Option<i64>,
    /// Transient failures so far
    pub retry_count: u32,
    /// Epoch millis before which the action is not replayed
    pub next_attempt_at: Option<i64>,
    /// Waiting for re-authentication
    pub held_for_auth: bool,
    /// Message of the last failure
    pub last_error: Option<String>,
    #[serde(skip)]
    in_flight: bool,
}

impl QueuedAction {
    /// New action, not yet queued
    pub fn new(entity_type: EntityType, operation: QueueOperation, id: impl Into<String>, payload: Value) -> Self {
        Self {
            seq: 0,
            entity_type,
            operation,
            id: id.into(),
            payload,
            enqueued_at: now_millis(),
            attempted_at: None,
            retry_count: 0,
            next_attempt_at: None,
            held_for_auth: false,
            last_error: None,
            in_flight: false,
        }
    }

    /// New action that waits for re-authentication before replay
    pub fn held(mut self, reason: impl Into<String>) -> Self {
        self.held_for_auth = true;
        self.last_error = Some(reason.into());
        self
    }

    /// Whether a drain is replaying this action right now
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    fn targets(&self, entity_type: EntityType, id: &str) -> bool {
        self.entity_type == entity_type && self.id == id
    }
}

/// Action the backend refused as invalid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RejectedAction {
    /// The refused action
    pub action: QueuedAction,
    /// Backend message
    pub message: String,
    /// Payload the backend echoed back
    pub rejected_payload: Value,
}

impl RejectedAction {
    /// The rejection as a remote error
    pub fn error(&self) -> RemoteError {
        RemoteError::validation(self.message.clone(), self.rejected_payload.clone())
    }
}

/// Replays queued actions against the backend
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Deliver one action; `Ok` confirms it and removes it from the queue
    async fn execute(&self, action: &QueuedAction) -> Result<(), RemoteError>;

    /// Whether the record is being written outside the queue right now;
    /// its actions are skipped by the current drain
    fn is_busy(&self, _entity_type: EntityType, _id: &str) -> bool {
        false
    }
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainResult {
    /// Actions confirmed and removed, in replay order
    pub confirmed: Vec<QueuedAction>,
    /// Transient failures rescheduled with backoff
    pub retried: usize,
    /// Actions refused as invalid during this pass
    pub rejected: Vec<RejectedAction>,
    /// Entity types stopped on an auth failure
    pub auth_blocked: Vec<EntityType>,
    /// The pass stopped because its token was cancelled
    pub cancelled: bool,
    /// Actions still queued after the pass
    pub remaining: usize,
    /// Earliest backoff deadline among remaining actions
    pub next_attempt_at: Option<i64>,
}

impl DrainResult {
    /// Whether the pass left the queue empty
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Actions waiting for replay, including held and in-flight ones
    pub pending: usize,
    /// Actions being replayed
    pub in_flight: usize,
    /// Actions waiting for re-authentication
    pub held: usize,
    /// Actions that failed transiently at least once
    pub retrying: usize,
    /// Actions refused as invalid
    pub rejected: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedQueue {
    version: u32,
    next_seq: u64,
    entries: Vec<QueuedAction>,
    rejected: Vec<RejectedAction>,
}

#[derive(Debug)]
struct QueueState {
    entries: VecDeque<QueuedAction>,
    rejected: Vec<RejectedAction>,
    next_seq: u64,
    degraded: Option<PersistenceDegraded>,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            rejected: Vec::new(),
            next_seq: 1,
            degraded: None,
        }
    }
}

/// Persistent queue of unconfirmed mutations
#[derive(Debug)]
pub struct OfflineQueue {
    state: Mutex<QueueState>,
    drain_lock: tokio::sync::Mutex<()>,
    medium: Arc<dyn StorageMedium>,
    backoff: BackoffStrategy,
}

impl OfflineQueue {
    /// Open the queue persisted on `medium`
    ///
    /// An unreadable or corrupted queue leaves the queue empty and memory-only.
    pub fn open(medium: Arc<dyn StorageMedium>, backoff: BackoffStrategy) -> Self {
        let mut state = QueueState::default();
        match load_queue(medium.as_ref()) {
            Ok(Some(persisted)) => {
                state.entries = persisted.entries.into();
                state.rejected = persisted.rejected;
                let highest = state
                    .entries
                    .iter()
                    .map(|a| a.seq)
                    .chain(state.rejected.iter().map(|r| r.action.seq))
                    .max()
                    .unwrap_or(0);
                state.next_seq = persisted.next_seq.max(highest + 1);
                tracing::info!("[Queue] restored {} pending actions", state.entries.len());
            }
            Ok(None) => {}
            Err(reason) => degrade(&mut state, reason),
        }
        Self {
            state: Mutex::new(state),
            drain_lock: tokio::sync::Mutex::new(()),
            medium,
            backoff,
        }
    }

    /// Queue backed by a fresh in-process medium
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryMedium::new()), BackoffStrategy::default())
    }

    /// Add an action, collapsing it into pending work for the same record
    ///
    /// Returns the sequence number of the entry now carrying the mutation.
    pub fn enqueue(&self, mut action: QueuedAction) -> u64 {
        let mut state = self.lock();
        let seq = match action.operation {
            QueueOperation::Update => {
                let target = state
                    .entries
                    .iter_mut()
                    .rev()
                    .find(|e| e.targets(action.entity_type, &action.id));
                match target {
                    Some(entry)
                        if !entry.in_flight
                            && matches!(entry.operation, QueueOperation::Create | QueueOperation::Update) =>
                    {
                        merge_payload(&mut entry.payload, action.payload);
                        entry.held_for_auth |= action.held_for_auth;
                        tracing::debug!(
                            "[Queue] collapsed update of {} '{}' into #{}",
                            entry.entity_type,
                            entry.id,
                            entry.seq
                        );
                        entry.seq
                    }
                    _ => append(&mut state, action),
                }
            }
            QueueOperation::Delete => {
                let before = state.entries.len();
                state
                    .entries
                    .retain(|e| e.in_flight || !e.targets(action.entity_type, &action.id));
                let discarded = before - state.entries.len();
                if discarded > 0 {
                    tracing::debug!(
                        "[Queue] delete of {} '{}' superseded {} pending actions",
                        action.entity_type,
                        action.id,
                        discarded
                    );
                }
                action.payload = Value::Null;
                append(&mut state, action)
            }
            QueueOperation::Create => append(&mut state, action),
        };
        self.persist(&mut state);
        seq
    }

    /// Enqueue an action issued before the work already queued for its record
    ///
    /// Used when a direct backend call fails after later changes of the same
    /// record were queued behind it. A create moves ahead of that work and
    /// absorbs queued updates; an update lands underneath the queued payload
    /// and is dropped if a delete is queued. Deletes behave as in `enqueue`.
    pub fn requeue(&self, mut action: QueuedAction) -> u64 {
        let mut state = self.lock();
        let first = state
            .entries
            .iter()
            .position(|e| !e.in_flight && e.targets(action.entity_type, &action.id));
        let seq = match (action.operation, first) {
            (QueueOperation::Delete, _) | (_, None) => {
                drop(state);
                return self.enqueue(action);
            }
            (QueueOperation::Update, Some(position)) => {
                let entry = &mut state.entries[position];
                if entry.operation != QueueOperation::Delete {
                    let newer = std::mem::replace(&mut entry.payload, action.payload);
                    merge_payload(&mut entry.payload, newer);
                    entry.held_for_auth |= action.held_for_auth;
                }
                entry.seq
            }
            (QueueOperation::Create, Some(position)) => {
                let mut index = position;
                while index < state.entries.len() {
                    let entry = &state.entries[index];
                    let absorb = !entry.in_flight
                        && entry.operation == QueueOperation::Update
                        && entry.targets(action.entity_type, &action.id);
                    if !absorb {
                        index += 1;
                        continue;
                    }
                    if let Some(update) = state.entries.remove(index) {
                        merge_payload(&mut action.payload, update.payload);
                        action.held_for_auth |= update.held_for_auth;
                    }
                }
                insert(&mut state, position, action)
            }
        };
        self.persist(&mut state);
        seq
    }

    /// Replay due actions now
    pub async fn drain<E>(&self, executor: &E, cancel: &CancellationToken) -> DrainResult
    where
        E: ActionExecutor + ?Sized,
    {
        self.drain_at(now_millis(), executor, cancel).await
    }

    /// Replay actions due at `now_ms`
    ///
    /// Only one drain runs at a time; a second caller waits for the first.
    pub async fn drain_at<E>(&self, now_ms: i64, executor: &E, cancel: &CancellationToken) -> DrainResult
    where
        E: ActionExecutor + ?Sized,
    {
        let _drain = self.drain_lock.lock().await;
        let mut result = DrainResult::default();
        let mut blocked_types: HashSet<EntityType> = HashSet::new();
        let mut blocked_ids: HashSet<(EntityType, String)> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let Some(action) = self.begin_next(now_ms, executor, &blocked_types, &blocked_ids) else {
                break;
            };
            let _claim = Claim {
                queue: self,
                seq: action.seq,
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = executor.execute(&action) => Some(outcome),
            };

            let mut state = self.lock();
            let Some(position) = state.entries.iter().position(|e| e.seq == action.seq) else {
                continue;
            };

            match outcome {
                None => {
                    result.cancelled = true;
                    tracing::info!("[Queue] drain cancelled, #{} stays queued", action.seq);
                    break;
                }
                Some(Ok(())) => {
                    if let Some(done) = state.entries.remove(position) {
                        tracing::debug!("[Queue] #{} {} {} '{}' confirmed", done.seq, done.operation, done.entity_type, done.id);
                        result.confirmed.push(done);
                    }
                    self.persist(&mut state);
                }
                Some(Err(RemoteError::Auth { message })) => {
                    let entry = &mut state.entries[position];
                    entry.held_for_auth = true;
                    entry.last_error = Some(message);
                    tracing::warn!("[Queue] auth required, holding {} actions", entry.entity_type);
                    blocked_types.insert(entry.entity_type);
                    result.auth_blocked.push(entry.entity_type);
                    self.persist(&mut state);
                }
                Some(Err(RemoteError::Validation { message, payload })) => {
                    if let Some(mut refused) = state.entries.remove(position) {
                        refused.in_flight = false;
                        refused.last_error = Some(message.clone());
                        tracing::warn!(
                            "[Queue] {} {} '{}' rejected: {}",
                            refused.operation,
                            refused.entity_type,
                            refused.id,
                            message
                        );
                        blocked_types.insert(refused.entity_type);
                        let rejected = RejectedAction {
                            action: refused,
                            message,
                            rejected_payload: payload,
                        };
                        state.rejected.push(rejected.clone());
                        result.rejected.push(rejected);
                    }
                    self.persist(&mut state);
                }
                Some(Err(error)) => {
                    let entry = &mut state.entries[position];
                    entry.retry_count = entry.retry_count.saturating_add(1);
                    entry.next_attempt_at = Some(self.backoff.next_attempt_at(now_ms, entry.retry_count));
                    entry.last_error = Some(error.to_string());
                    tracing::info!(
                        "[Queue] #{} failed ({}), retry {} after {:?}",
                        entry.seq,
                        error,
                        entry.retry_count,
                        self.backoff.delay_for(entry.retry_count)
                    );
                    blocked_ids.insert((entry.entity_type, entry.id.clone()));
                    result.retried += 1;
                    self.persist(&mut state);
                }
            }
        }

        let state = self.lock();
        result.remaining = state.entries.len();
        result.next_attempt_at = next_deadline(&state);
        result
    }

    /// Pending actions of one entity type, in replay order
    pub fn peek_pending(&self, entity_type: EntityType) -> Vec<QueuedAction> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect()
    }

    /// All pending actions in replay order
    pub fn snapshot(&self) -> Vec<QueuedAction> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Pending actions for one record, in-flight ones included
    pub fn pending_count_for(&self, entity_type: EntityType, id: &str) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.targets(entity_type, id))
            .count()
    }

    /// Whether any action for the record is pending
    pub fn has_pending(&self, entity_type: EntityType, id: &str) -> bool {
        self.pending_count_for(entity_type, id) > 0
    }

    /// Number of pending actions
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop pending (not in-flight) actions for a record; returns how many
    pub fn discard_for(&self, entity_type: EntityType, id: &str) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.in_flight || !e.targets(entity_type, id));
        let discarded = before - state.entries.len();
        if discarded > 0 {
            self.persist(&mut state);
        }
        discarded
    }

    /// Point every action for `old_id` at the server-assigned `new_id`
    pub fn rekey(&self, entity_type: EntityType, old_id: &str, new_id: &str) -> usize {
        let mut state = self.lock();
        let mut changed = 0;
        for entry in state.entries.iter_mut().filter(|e| e.targets(entity_type, old_id)) {
            entry.id = new_id.to_string();
            if let Some(record) = entry.payload.as_object_mut() {
                if record.contains_key("id") {
                    record.insert("id".to_string(), Value::String(new_id.to_string()));
                }
            }
            changed += 1;
        }
        if changed > 0 {
            self.persist(&mut state);
        }
        changed
    }

    /// Make auth-held actions eligible again; returns how many
    pub fn release_auth_holds(&self) -> usize {
        let mut state = self.lock();
        let mut released = 0;
        for entry in state.entries.iter_mut().filter(|e| e.held_for_auth) {
            entry.held_for_auth = false;
            entry.next_attempt_at = None;
            released += 1;
        }
        if released > 0 {
            self.persist(&mut state);
        }
        released
    }

    /// Actions refused as invalid, oldest first
    pub fn rejected(&self) -> Vec<RejectedAction> {
        self.lock().rejected.clone()
    }

    /// Re-queue a rejected action, optionally with a corrected payload
    ///
    /// The action goes ahead of later work for its record (see `requeue`),
    /// so a queued correction is absorbed into a retried create. Returns the sequence number of the queued entry, or `None` if no
    /// rejected action has `seq`.
    pub fn retry_rejected(&self, seq: u64, payload: Option<Value>) -> Option<u64> {
        let rejected = {
            let mut state = self.lock();
            let position = state.rejected.iter().position(|r| r.action.seq == seq)?;
            state.rejected.remove(position)
        };
        let mut action = QueuedAction::new(
            rejected.action.entity_type,
            rejected.action.operation,
            rejected.action.id,
            payload.unwrap_or(rejected.action.payload),
        );
        action.enqueued_at = rejected.action.enqueued_at;
        Some(self.requeue(action))
    }

    /// Record an action the backend refused outside a drain
    pub fn reject(&self, mut action: QueuedAction, message: impl Into<String>, rejected_payload: Value) -> u64 {
        let mut state = self.lock();
        action.seq = state.next_seq;
        action.in_flight = false;
        state.next_seq += 1;
        let message = message.into();
        action.last_error = Some(message.clone());
        let seq = action.seq;
        state.rejected.push(RejectedAction {
            action,
            message,
            rejected_payload,
        });
        self.persist(&mut state);
        seq
    }

    /// Forget a rejected action
    pub fn discard_rejected(&self, seq: u64) -> Option<RejectedAction> {
        let mut state = self.lock();
        let position = state.rejected.iter().position(|r| r.action.seq == seq)?;
        let discarded = state.rejected.remove(position);
        self.persist(&mut state);
        Some(discarded)
    }

    /// Earliest backoff deadline among actions that are not held
    pub fn next_attempt_at(&self) -> Option<i64> {
        next_deadline(&self.lock())
    }

    /// Queue statistics
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let mut stats = QueueStats {
            pending: state.entries.len(),
            rejected: state.rejected.len(),
            ..QueueStats::default()
        };
        for entry in &state.entries {
            if entry.in_flight {
                stats.in_flight += 1;
            }
            if entry.held_for_auth {
                stats.held += 1;
            }
            if entry.retry_count > 0 {
                stats.retrying += 1;
            }
        }
        stats
    }

    /// Degradation notice, if the queue fell back to memory-only
    pub fn degradation(&self) -> Option<PersistenceDegraded> {
        self.lock().degraded.clone()
    }

    /// Claim the first action that may be replayed at `now_ms`
    fn begin_next<E>(
        &self,
        now_ms: i64,
        executor: &E,
        blocked_types: &HashSet<EntityType>,
        blocked_ids: &HashSet<(EntityType, String)>,
    ) -> Option<QueuedAction>
    where
        E: ActionExecutor + ?Sized,
    {
        let mut state = self.lock();
        // Records with an earlier action that cannot go now keep their order
        let mut waiting: HashSet<(EntityType, &str)> = HashSet::new();
        let mut held_types: HashSet<EntityType> = HashSet::new();
        let mut chosen = None;

        for (position, entry) in state.entries.iter().enumerate() {
            let key = (entry.entity_type, entry.id.as_str());
            let eligible = !entry.in_flight
                && !entry.held_for_auth
                && !blocked_types.contains(&entry.entity_type)
                && !held_types.contains(&entry.entity_type)
                && !blocked_ids.contains(&(entry.entity_type, entry.id.clone()))
                && !waiting.contains(&key)
                && !executor.is_busy(entry.entity_type, &entry.id)
                && entry.next_attempt_at.map_or(true, |due| due <= now_ms);
            if eligible {
                chosen = Some(position);
                break;
            }
            if entry.held_for_auth {
                held_types.insert(entry.entity_type);
            }
            waiting.insert(key);
        }

        let position = chosen?;
        let entry = &mut state.entries[position];
        entry.in_flight = true;
        entry.attempted_at = Some(now_ms);
        Some(entry.clone())
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &mut MutexGuard<'_, QueueState>) {
        if state.degraded.is_some() {
            return;
        }
        let persisted = PersistedQueue {
            version: CURRENT_SCHEMA_VERSION,
            next_seq: state.next_seq,
            entries: state.entries.iter().cloned().collect(),
            rejected: state.rejected.clone(),
        };
        let result = serde_json::to_vec(&persisted)
            .map_err(MediumError::from)
            .and_then(|bytes| self.medium.write(QUEUE_KEY, &bytes));
        if let Err(e) = result {
            degrade(state, format!("failed to persist offline queue: {}", e));
        }
    }
}

/// Entry claimed by a drain; releasing the claim clears `in_flight`
///
/// Also runs when the drain future is dropped mid-call, so the entry is
/// replayed by the next drain.
struct Claim<'a> {
    queue: &'a OfflineQueue,
    seq: u64,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut state = self.queue.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.seq == self.seq) {
            entry.in_flight = false;
        }
    }
}

fn append(state: &mut QueueState, action: QueuedAction) -> u64 {
    let position = state.entries.len();
    insert(state, position, action)
}

fn insert(state: &mut QueueState, position: usize, mut action: QueuedAction) -> u64 {
    action.seq = state.next_seq;
    action.in_flight = false;
    state.next_seq += 1;
    tracing::debug!(
        "[Queue] #{} {} {} '{}' queued",
        action.seq,
        action.operation,
        action.entity_type,
        action.id
    );
    let seq = action.seq;
    state.entries.insert(position, action);
    seq
}

/// Shallow merge, later keys win; a non-object payload replaces the old one
fn merge_payload(target: &mut Value, update: Value) {
    match (target.as_object_mut(), update) {
        (Some(existing), Value::Object(changes)) => {
            for (key, value) in changes {
                existing.insert(key, value);
            }
        }
        (_, replacement) => *target = replacement,
    }
}

/// Earliest retry deadline of an action that could run once it is due
fn next_deadline(state: &QueueState) -> Option<i64> {
    let mut seen: HashSet<(EntityType, &str)> = HashSet::new();
    let mut held_types: HashSet<EntityType> = HashSet::new();
    let mut deadline: Option<i64> = None;
    for entry in &state.entries {
        let first_for_record = seen.insert((entry.entity_type, entry.id.as_str()));
        if entry.held_for_auth {
            held_types.insert(entry.entity_type);
            continue;
        }
        if !first_for_record || entry.in_flight || held_types.contains(&entry.entity_type) {
            continue;
        }
        if let Some(due) = entry.next_attempt_at {
            deadline = Some(deadline.map_or(due, |current| current.min(due)));
        }
    }
    deadline
}

fn degrade(state: &mut QueueState, reason: String) {
    if state.degraded.is_none() {
        tracing::warn!("[Queue] persistence degraded, continuing memory-only: {}", reason);
        state.degraded = Some(PersistenceDegraded::new(reason));
    }
}

fn load_queue(medium: &dyn StorageMedium) -> Result<Option<PersistedQueue>, String> {
    let Some(bytes) = medium
        .read(QUEUE_KEY)
        .map_err(|e| format!("cannot read {}: {}", QUEUE_KEY, e))?
    else {
        return Ok(None);
    };
    let persisted: PersistedQueue =
        serde_json::from_slice(&bytes).map_err(|e| format!("corrupted {}: {}", QUEUE_KEY, e))?;
    if !is_supported(persisted.version) {
        return Err(format!("{} has unsupported version {}", QUEUE_KEY, persisted.version));
    }
    Ok(Some(persisted))
}
