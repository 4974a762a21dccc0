//! Property-based tests for the local store

use estate_sync::local_db::LocalStore;
use estate_sync::schema::normalize;
use estate_sync::shared::EntityType;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum StoreOp {
    Put { id: u8, title: String, updated_at: i64 },
    Remove { id: u8 },
}

fn store_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => (0u8..5, "[a-z]{0,6}", 0i64..1_000)
            .prop_map(|(id, title, updated_at)| StoreOp::Put { id, title, updated_at }),
        1 => (0u8..5).prop_map(|id| StoreOp::Remove { id }),
    ]
}

proptest! {
    #[test]
    fn test_store_matches_map_model(ops in prop::collection::vec(store_op(), 0..40)) {
        let store = LocalStore::in_memory();
        let mut model: HashMap<String, (String, i64)> = HashMap::new();
        let mut watermarks: HashMap<String, i64> = HashMap::new();

        for op in ops {
            match op {
                StoreOp::Put { id, title, updated_at } => {
                    let id = format!("p{}", id);
                    let entity = normalize(
                        EntityType::Property,
                        &json!({"id": id, "title": title, "updatedAt": updated_at}),
                    )
                    .unwrap();
                    let stored = store.put(entity);

                    let floor = watermarks.get(&id).copied().unwrap_or(0);
                    let expected = updated_at.max(floor);
                    watermarks.insert(id.clone(), expected);
                    prop_assert_eq!(stored.updated_at, expected);
                    model.insert(id, (title, expected));
                }
                StoreOp::Remove { id } => {
                    let id = format!("p{}", id);
                    let removed = store.remove(EntityType::Property, &id);
                    prop_assert_eq!(removed.is_some(), model.remove(&id).is_some());
                }
            }
        }

        let mut listed: Vec<(String, String, i64)> = store
            .list(EntityType::Property)
            .iter()
            .map(|e| (e.id.clone(), e.text("title").unwrap_or_default().to_string(), e.updated_at))
            .collect();
        listed.sort();
        let mut expected: Vec<(String, String, i64)> = model
            .into_iter()
            .map(|(id, (title, updated_at))| (id, title, updated_at))
            .collect();
        expected.sort();
        prop_assert_eq!(listed, expected);
    }
}
