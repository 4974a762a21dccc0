//! Change Events
//!
//! Every mutation the local store applies is described by one `ChangeEvent`.
//! The variant names the operation and carries the entity snapshot, so the
//! entity type and id always travel with it.

use crate::shared::entity::{Entity, EntityType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// New id in the collection
    Create,
    /// Existing id replaced
    Update,
    /// Id removed from the collection
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        })
    }
}

/// Mutation applied to the local store
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Entity inserted; snapshot after insertion
    Created(Entity),
    /// Entity replaced; snapshot after replacement
    Updated(Entity),
    /// Entity removed; last snapshot before removal
    Deleted(Entity),
}

impl ChangeEvent {
    /// Collection the event belongs to
    pub fn entity_type(&self) -> EntityType {
        self.snapshot().entity_type
    }

    /// Id of the mutated entity
    pub fn id(&self) -> &str {
        &self.snapshot().id
    }

    /// Operation kind
    pub fn operation(&self) -> ChangeOperation {
        match self {
            ChangeEvent::Created(_) => ChangeOperation::Create,
            ChangeEvent::Updated(_) => ChangeOperation::Update,
            ChangeEvent::Deleted(_) => ChangeOperation::Delete,
        }
    }

    /// Entity snapshot carried by the event
    pub fn snapshot(&self) -> &Entity {
        match self {
            ChangeEvent::Created(entity)
            | ChangeEvent::Updated(entity)
            | ChangeEvent::Deleted(entity) => entity,
        }
    }
}
