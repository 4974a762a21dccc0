//! # Sync State Management
//!
//! Coordinator phase and the status snapshot published to the UI.
//!
//! ## Phases
//!
//! ```text
//!            connectivity restored             queue drained empty
//!  Offline ───────────────────────▶ OnlineSyncing ─────────────────▶ OnlineIdle
//!     ▲                                  │  ▲                           │
//!     │        connectivity lost         │  │    work queued online     │
//!     └──────────────────────────────────┘  └───────────────────────────┤
//!     ▲                                                                 │
//!     └──────────────────────── connectivity lost ──────────────────────┘
//! ```

use std::fmt;

/// Coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncPhase {
    /// No connectivity; writes are applied locally and queued
    #[default]
    Offline,
    /// Connected and replaying the queue; writes are still queued
    OnlineSyncing,
    /// Connected with nothing pending; writes go straight to the backend
    OnlineIdle,
}

impl SyncPhase {
    /// Whether the backend is reachable in this phase
    pub fn is_online(&self) -> bool {
        !matches!(self, SyncPhase::Offline)
    }

    /// Whether `self → next` is a transition of the phase machine
    pub fn can_transition_to(&self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        matches!(
            (self, next),
            (Offline, OnlineSyncing)
                | (OnlineSyncing, OnlineIdle)
                | (OnlineSyncing, Offline)
                | (OnlineIdle, Offline)
                | (OnlineIdle, OnlineSyncing)
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncPhase::Offline => "offline",
            SyncPhase::OnlineSyncing => "syncing",
            SyncPhase::OnlineIdle => "online",
        })
    }
}

/// Snapshot of the synchronization status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncStatus {
    /// Current phase
    pub phase: SyncPhase,
    /// Queued changes not yet confirmed
    pub pending: usize,
    /// Changes the backend refused
    pub rejected: usize,
    /// Queued changes waiting for re-authentication
    pub held: usize,
    /// The backend asked for new credentials
    pub auth_required: bool,
    /// Epoch millis of the last completed drain
    pub last_sync_at: Option<i64>,
    /// Local persistence fell back to memory-only
    pub persistence_degraded: bool,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pending {
            0 => f.write_str("All changes synced")?,
            1 => f.write_str("1 change pending sync")?,
            n => write!(f, "{} changes pending sync", n)?,
        }
        if self.rejected > 0 {
            write!(f, ", {} rejected", self.rejected)?;
        }
        if self.auth_required {
            f.write_str(", sign-in required")?;
        }
        if self.persistence_degraded {
            f.write_str(" (not saved on this device)")?;
        }
        Ok(())
    }
}
