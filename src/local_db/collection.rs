//! Entity Collections
//!
//! An insertion-ordered `id → Entity` map and the immutable snapshot type
//! handed out by `LocalStore::list`.

use crate::shared::entity::Entity;
use std::collections::HashMap;
use std::sync::Arc;

/// Insertion-ordered collection of one entity type
#[derive(Debug, Default, Clone)]
pub(crate) struct Collection {
    order: Vec<String>,
    entries: HashMap<String, Entity>,
}

impl Collection {
    pub(crate) fn get(&self, id: &str) -> Option<&Entity> {
        self.entries.get(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert or replace; returns the previous value. A replaced entity keeps
    /// its position.
    pub(crate) fn upsert(&mut self, entity: Entity) -> Option<Entity> {
        let id = entity.id.clone();
        let previous = self.entries.insert(id.clone(), entity);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Entity> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Entities in insertion order
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }
}

/// Snapshot of a collection taken at call time
///
/// Iterating does not observe later writes; iterate as often as needed.
#[derive(Debug, Clone, Default)]
pub struct EntityList {
    items: Arc<[Entity]>,
}

impl EntityList {
    pub(crate) fn new(items: Vec<Entity>) -> Self {
        Self { items: items.into() }
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    /// Lazily filter the snapshot
    pub fn matching<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Entity> + 'a
    where
        P: Fn(&Entity) -> bool + 'a,
    {
        self.items.iter().filter(move |e| predicate(e))
    }

    /// Ids in insertion order
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|e| e.id.as_str()).collect()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Owned copy of the entities
    pub fn to_vec(&self) -> Vec<Entity> {
        self.items.to_vec()
    }
}

impl<'a> IntoIterator for &'a EntityList {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
