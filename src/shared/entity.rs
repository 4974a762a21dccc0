//! Entity Types
//!
//! The canonical in-memory shape of every business record. Entities are only
//! ever built by the normalizer (`crate::schema::normalize`) so that the
//! camelCase invariant on field names holds everywhere else in the crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Record keys that live outside `Entity::fields`
pub const RESERVED_KEYS: &[&str] = &["id", "updatedAt", "syncState"];

/// Business entity collections known to the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    /// Listed or managed property
    Property,
    /// Person in the address book
    Contact,
    /// Sale or rental pipeline entry
    Deal,
    /// Field agent
    Agent,
    /// To-do item
    Task,
    /// Agent visit captured on site
    CheckIn,
    /// Photo or voice note attached to another record
    Media,
}

impl EntityType {
    /// Every entity type, in a stable order
    pub const ALL: [EntityType; 7] = [
        EntityType::Property,
        EntityType::Contact,
        EntityType::Deal,
        EntityType::Agent,
        EntityType::Task,
        EntityType::CheckIn,
        EntityType::Media,
    ];

    /// Name used for storage keys and REST routes
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Property => "properties",
            EntityType::Contact => "contacts",
            EntityType::Deal => "deals",
            EntityType::Agent => "agents",
            EntityType::Task => "tasks",
            EntityType::CheckIn => "check-ins",
            EntityType::Media => "media",
        }
    }

    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Property => "Property",
            EntityType::Contact => "Contact",
            EntityType::Deal => "Deal",
            EntityType::Agent => "Agent",
            EntityType::Task => "Task",
            EntityType::CheckIn => "CheckIn",
            EntityType::Media => "Media",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || t.collection() == s)
            .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

/// Where an entity stands relative to the remote backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    /// Exists only on this device and is not scheduled for upload
    #[default]
    LocalOnly,
    /// Has a queued action waiting for remote confirmation
    PendingUpload,
    /// Matches the last version confirmed by the backend
    Synced,
    /// The backend rejected the last change
    Conflict,
}

impl SyncState {
    /// Canonical kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::LocalOnly => "local-only",
            SyncState::PendingUpload => "pending-upload",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
        }
    }

    /// Lenient parse accepting kebab-case, snake_case and camelCase spellings
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "localonly" | "local" => Some(SyncState::LocalOnly),
            "pendingupload" | "pending" => Some(SyncState::PendingUpload),
            "synced" => Some(SyncState::Synced),
            "conflict" => Some(SyncState::Conflict),
            _ => None,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One canonical business record
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Collection this record belongs to
    pub entity_type: EntityType,
    /// Unique id within the collection
    pub id: String,
    /// Canonical camelCase attributes
    pub fields: Map<String, Value>,
    /// Milliseconds since the Unix epoch of the last business mutation
    pub updated_at: i64,
    /// Relation to the remote backend
    pub sync_state: SyncState,
}

impl Entity {
    /// Read a field by canonical name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Read a text field by canonical name
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Copy with a different sync state
    pub fn with_sync_state(mut self, sync_state: SyncState) -> Self {
        self.sync_state = sync_state;
        self
    }

    /// Flat canonical record, as persisted on the device
    pub fn to_record(&self) -> Value {
        let mut record = self.to_remote_map();
        record.insert(
            "syncState".to_string(),
            Value::String(self.sync_state.as_str().to_string()),
        );
        Value::Object(record)
    }

    /// Flat canonical record without local-only bookkeeping, as sent upstream
    pub fn to_remote_record(&self) -> Value {
        Value::Object(self.to_remote_map())
    }

    fn to_remote_map(&self) -> Map<String, Value> {
        let mut record = Map::with_capacity(self.fields.len() + 3);
        record.insert("id".to_string(), Value::String(self.id.clone()));
        for (key, value) in &self.fields {
            record.insert(key.clone(), value.clone());
        }
        record.insert("updatedAt".to_string(), Value::from(self.updated_at));
        record
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Timestamp for a mutation following one stamped `previous`
///
/// Never returns a value at or below `previous`, even if the wall clock
/// stepped backwards.
pub fn next_timestamp(previous: i64) -> i64 {
    now_millis().max(previous.saturating_add(1))
}
