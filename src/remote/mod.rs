//! # Remote Persistence Adapter
//!
//! Asynchronous, network-bound mirror of the local store contract. Adapters
//! only return results or errors; the synchronization coordinator is the one
//! that applies them locally.
//!
//! ## Key Components
//!
//! - `http.rs`: REST backend over `reqwest`
//! - `memory.rs`: in-process backend with scripted failures

pub mod http;
pub mod memory;

pub use http::HttpRemote;
pub use memory::{MemoryRemote, RemoteCall, RemoteOperation};

use crate::shared::entity::{Entity, EntityType};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};

/// Remote backend for entity collections
///
/// Every call may fail with `Network`/`Timeout` (retry), `Auth` (hold until
/// re-authentication) or `Validation` (never retried).
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Every record of a collection
    async fn fetch_all(&self, entity_type: EntityType) -> Result<Vec<Entity>, RemoteError>;

    /// Create a record; the returned entity carries the server-confirmed id
    async fn create(&self, entity_type: EntityType, entity: &Entity) -> Result<Entity, RemoteError>;

    /// Patch the fields in `partial`
    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        partial: &Map<String, Value>,
    ) -> Result<Entity, RemoteError>;

    /// Delete a record; deleting a missing record succeeds
    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError>;
}

/// Shared bearer credential slot
///
/// Written by whoever owns authentication, read by adapters on every call.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
    /// Slot holding `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        let credentials = Self::default();
        credentials.set(token);
        credentials
    }

    /// Store a new token
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Forget the token
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Current token
    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
