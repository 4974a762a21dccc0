//! Persisted Layout
//!
//! Storage keys and the on-medium envelope of a collection.

use crate::shared::entity::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current on-medium format version
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Formats this build can read
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Key of the offline queue
pub const QUEUE_KEY: &str = "offline_queue";

/// Key of an entity collection
pub fn collection_key(entity_type: EntityType) -> String {
    format!("collections/{}", entity_type.collection())
}

/// Check if stored data can be read by this build
pub fn is_supported(version: u32) -> bool {
    SUPPORTED_VERSIONS.contains(&version)
}

/// Envelope of one persisted collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCollection {
    /// Format version
    pub version: u32,
    /// Flat canonical records in insertion order
    pub records: Vec<Value>,
}

impl PersistedCollection {
    /// Wrap records in the current format
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            records,
        }
    }
}
