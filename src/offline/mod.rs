//! # Offline Action Queue
//!
//! Store-and-forward delivery of local mutations to the remote backend.
//!
//! ## Architecture
//!
//! - **Operation Queue**: persistent FIFO of unconfirmed mutations, collapsed
//!   per record so the backend sees one call per pending change
//! - **Retry Logic**: transient failures back off exponentially and retry
//!   without limit
//!
//! ## Key Components
//!
//! - `queue.rs`: `OfflineQueue`, `QueuedAction`, `ActionExecutor`, drain
//! - `retry.rs`: `BackoffStrategy`
//!
//! The synchronization coordinator is the only executor; see `crate::sync`.

pub mod queue;
pub mod retry;

pub use queue::{
    ActionExecutor, DrainResult, OfflineQueue, QueueOperation, QueueStats, QueuedAction, RejectedAction,
};
pub use retry::BackoffStrategy;
