//! Shared Module
//!
//! Types shared by every layer of the engine: the canonical entity, change
//! events, the error taxonomy and the validated application configuration.

/// Canonical entity and sync-state types
pub mod entity;

/// Change events published by the local store
pub mod event;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use entity::{Entity, EntityType, SyncState};
pub use error::{CommandError, HandlerError, MediumError, PersistenceDegraded, RemoteError, SchemaError};
pub use event::{ChangeEvent, ChangeOperation};
