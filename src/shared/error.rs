//! Shared Error Types
//!
//! This module defines the error taxonomy of the synchronization engine.
//! Each layer owns one enum; the coordinator decides which of them are
//! retried, surfaced to the UI, or swallowed.
//!
//! # Error Categories
//!
//! - `SchemaError` - a raw record could not be normalized (missing identity)
//! - `PersistenceDegraded` - the device medium is gone, the store runs memory-only
//! - `MediumError` - a single read/write against the device medium failed
//! - `RemoteError` - a remote adapter call failed (network, auth, validation)
//! - `HandlerError` - a change subscriber reported a failure
//! - `CommandError` - a write command was refused before touching any state
//!
//! # Usage
//!
//! ```rust
//! use estate_sync::shared::error::RemoteError;
//!
//! let error = RemoteError::network("connection reset");
//! assert!(error.is_retryable());
//! ```
use crate::shared::entity::EntityType;
use thiserror::Error;

/// A raw record could not be turned into a canonical entity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// No usable `id` after normalization
    #[error("{entity_type} record has no id")]
    MissingId {
        /// Collection the record was meant for
        entity_type: EntityType,
    },

    /// The raw record was not a JSON object
    #[error("{entity_type} record is not an object (found {found})")]
    NotAnObject {
        /// Collection the record was meant for
        entity_type: EntityType,
        /// JSON kind that was found instead
        found: &'static str,
    },
}

/// The device-local medium is unavailable; the store continues memory-only
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("local persistence degraded, continuing memory-only: {reason}")]
pub struct PersistenceDegraded {
    /// Human-readable reason, taken from the first failure
    pub reason: String,
}

impl PersistenceDegraded {
    /// Create a new degradation notice
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure of a single storage medium operation
#[derive(Debug, Error)]
pub enum MediumError {
    /// Filesystem error
    #[error("medium I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Medium switched off or not reachable
    #[error("medium unavailable: {message}")]
    Unavailable {
        /// Human-readable error message
        message: String,
    },

    /// Stored bytes could not be encoded or decoded
    #[error("medium serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MediumError {
    /// Create a new unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors returned by a remote persistence adapter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    /// Transient transport failure, eligible for retry
    #[error("network error: {message}")]
    Network {
        /// Human-readable error message
        message: String,
    },

    /// The call did not finish within its deadline; retried like `Network`
    #[error("remote call timed out after {millis} ms")]
    Timeout {
        /// Deadline that elapsed
        millis: u64,
    },

    /// Credentials missing or rejected; held until re-authentication
    #[error("authentication required: {message}")]
    Auth {
        /// Human-readable error message
        message: String,
    },

    /// The backend refused the payload; never retried
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable error message
        message: String,
        /// The payload the backend rejected
        payload: serde_json::Value,
    },
}

impl RemoteError {
    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new validation error carrying the rejected payload
    pub fn validation(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Validation {
            message: message.into(),
            payload,
        }
    }

    /// Whether the queue should keep retrying this failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// Failure reported by a change subscriber
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("change handler failed: {message}")]
pub struct HandlerError {
    /// Human-readable error message
    pub message: String,
}

impl HandlerError {
    /// Create a new handler error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A write command refused before any state was touched
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    /// Update or delete of an id the local store does not hold
    #[error("{entity_type} '{id}' not found")]
    NotFound {
        /// Collection searched
        entity_type: EntityType,
        /// Requested id
        id: String,
    },

    /// Create with an id that is already taken
    #[error("{entity_type} '{id}' already exists")]
    AlreadyExists {
        /// Collection searched
        entity_type: EntityType,
        /// Requested id
        id: String,
    },

    /// The command payload could not be normalized
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl CommandError {
    /// Create a new not-found error
    pub fn not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }
}
