//! # Conflict Resolution
//!
//! Last-writer-wins by `updatedAt` between a local entity and the version a
//! remote fetch returned. No field-level merge: each record has effectively
//! one writer at a time.
//!
//! Equal timestamps keep the local version, so a pull never undoes a local
//! change it cannot prove is older.

use crate::shared::entity::{Entity, SyncState};

/// What a pull does with one remote entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Unknown locally; insert as synced
    Insert,
    /// Remote is newer; overwrite local and drop superseded queued work
    TakeRemote,
    /// Local is as new or newer; leave it
    KeepLocal,
}

/// Decide between `local` and `remote` for the same id
pub fn resolve(local: Option<&Entity>, remote: &Entity) -> Resolution {
    match local {
        None => Resolution::Insert,
        Some(local) if remote.updated_at > local.updated_at => Resolution::TakeRemote,
        Some(_) => Resolution::KeepLocal,
    }
}

/// Whether a local entity missing from a full remote fetch should be removed
///
/// Only entities the backend already confirmed, with no queued work, were
/// deleted remotely; anything else simply has not been uploaded yet.
pub fn is_remotely_deleted(local: &Entity, has_pending: bool) -> bool {
    local.sync_state == SyncState::Synced && !has_pending
}
