//! Property-based tests for offline queue coalescing
//!
//! Replaying the collapsed queue must leave the backend exactly where
//! delivering every mutation one by one would.

use async_trait::async_trait;
use estate_sync::offline::{ActionExecutor, OfflineQueue, QueueOperation, QueuedAction};
use estate_sync::shared::{EntityType, RemoteError};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

type Records = HashMap<String, Map<String, Value>>;

#[derive(Default)]
struct ModelBackend {
    records: Mutex<Records>,
}

#[async_trait]
impl ActionExecutor for ModelBackend {
    async fn execute(&self, action: &QueuedAction) -> Result<(), RemoteError> {
        apply(&mut self.records.lock().unwrap(), action.operation, &action.id, &action.payload);
        Ok(())
    }
}

/// Create replaces, update merges into an existing record, delete removes
fn apply(records: &mut Records, operation: QueueOperation, id: &str, payload: &Value) {
    let fields = payload.as_object().cloned().unwrap_or_default();
    match operation {
        QueueOperation::Create => {
            records.insert(id.to_string(), fields);
        }
        QueueOperation::Update => {
            if let Some(record) = records.get_mut(id) {
                record.extend(fields);
            }
        }
        QueueOperation::Delete => {
            records.remove(id);
        }
    }
}

fn action() -> impl Strategy<Value = (QueueOperation, String, Value)> {
    let operation = prop_oneof![
        Just(QueueOperation::Create),
        Just(QueueOperation::Update),
        Just(QueueOperation::Delete),
    ];
    let fields = prop::collection::btree_map(prop::sample::select(vec!["a", "b", "c"]), 0i64..10, 0..3)
        .prop_map(|fields| {
            Value::Object(fields.into_iter().map(|(k, v)| (k.to_string(), Value::from(v))).collect())
        });
    (operation, (0u8..3).prop_map(|id| format!("t{}", id)), fields)
}

proptest! {
    #[test]
    fn test_collapsed_replay_matches_direct_delivery(actions in prop::collection::vec(action(), 0..30)) {
        let queue = OfflineQueue::in_memory();
        let mut direct = Records::new();

        for (operation, id, payload) in &actions {
            apply(&mut direct, *operation, id, payload);
            queue.enqueue(QueuedAction::new(EntityType::Task, *operation, id.clone(), payload.clone()));
        }
        prop_assert!(queue.len() <= actions.len());

        let seqs: Vec<u64> = queue.snapshot().iter().map(|a| a.seq).collect();
        prop_assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));

        let backend = ModelBackend::default();
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let result = runtime.block_on(queue.drain(&backend, &CancellationToken::new()));

        prop_assert!(result.is_empty());
        prop_assert!(queue.is_empty());
        prop_assert_eq!(backend.records.into_inner().unwrap(), direct);
    }
}
