//! Estate Sync - Main Library
//!
//! Estate Sync is the local-first data layer of a real-estate CRM client. The
//! UI reads and writes a device-local store; a coordinator keeps that store in
//! step with a REST backend whenever connectivity allows.
//!
//! # Overview
//!
//! - Optimistic writes that never fail because of the network
//! - Schema normalization of legacy and imported records
//! - Ordered change events for reactive views
//! - A persistent offline queue replayed with backoff
//! - Last-writer-wins reconciliation on pull
//!
//! # Module Structure
//!
//! - **`shared`** - Entity, change event, error and configuration types
//! - **`schema`** - Canonical field tables and the normalizer
//! - **`local_db`** - Device-local store and its storage media
//! - **`realtime`** - Change bus feeding subscribers
//! - **`remote`** - Backend adapters (HTTP and in-memory)
//! - **`offline`** - Offline queue and retry backoff
//! - **`sync`** - Sync coordinator, phase machine and background service
//! - **`config`** - Environment-backed configuration wrapper
//! - **`logging`** - Tracing setup
//!
//! # Usage
//!
//! ```rust,no_run
//! use estate_sync::config::Config;
//! use estate_sync::local_db::{FileMedium, LocalStore};
//! use estate_sync::offline::{BackoffStrategy, OfflineQueue};
//! use estate_sync::remote::HttpRemote;
//! use estate_sync::shared::EntityType;
//! use estate_sync::sync::{NetworkMonitor, SyncCoordinator, SyncService};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let medium = Arc::new(FileMedium::open(config.storage_dir())?);
//!
//! let coordinator = Arc::new(SyncCoordinator::new(
//!     Arc::new(LocalStore::open(medium.clone())),
//!     Arc::new(OfflineQueue::open(medium, BackoffStrategy::from_config(config.app()))),
//!     Arc::new(HttpRemote::from_config(&config)?),
//!     config.app().clone(),
//! ));
//!
//! let monitor = NetworkMonitor::default();
//! let service = SyncService::start(coordinator.clone(), &monitor);
//!
//! coordinator.create(EntityType::Contact, json!({"firstName": "Ada"})).await?;
//! monitor.set_online(true);
//!
//! service.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Every component is `Send + Sync` and shared through `Arc`. Locks are
//! never held across an `.await`; change events are delivered outside the
//! store lock, in mutation order.
//!
//! # Error Handling
//!
//! - `CommandError` for writes refused before any state changed
//! - `RemoteError` for backend failures, classified by retryability
//! - `PersistenceDegraded` when the device store falls back to memory

/// Shared types and data structures
pub mod shared;

/// Entity schema and normalization
pub mod schema;

/// Device-local store
pub mod local_db;

/// Change bus
pub mod realtime;

/// Backend adapters
pub mod remote;

/// Offline queue and retry
pub mod offline;

/// Synchronization coordinator
pub mod sync;

/// Environment-backed configuration
pub mod config;

/// Tracing setup
pub mod logging;
