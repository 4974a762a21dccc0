//! # Sync Metrics
//!
//! Counters describing how local changes reached the backend.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub average_sync_duration: Duration,
    pub last_sync_duration: Option<Duration>,
    pub last_sync_start: Option<Instant>,
    /// Queued actions confirmed by the backend
    pub actions_confirmed: u64,
    /// Queued actions rescheduled after a transient failure
    pub actions_retried: u64,
    /// Actions the backend refused
    pub actions_rejected: u64,
    /// Writes confirmed without going through the queue
    pub direct_writes: u64,
    /// Direct writes that fell back to the queue
    pub fallbacks: u64,
    /// Local entities overwritten by a newer remote version
    pub remote_wins: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sync_start(&mut self) {
        self.last_sync_start = Some(Instant::now());
        self.total_syncs += 1;
    }

    /// A drain finished without being cancelled
    pub fn record_sync_success(&mut self, confirmed: usize, retried: usize, rejected: usize) {
        self.actions_confirmed += confirmed as u64;
        self.actions_retried += retried as u64;
        self.actions_rejected += rejected as u64;
        if let Some(start) = self.last_sync_start.take() {
            let duration = start.elapsed();
            self.last_sync_duration = Some(duration);
            self.successful_syncs += 1;

            // Rolling average
            let total = self.average_sync_duration * (self.successful_syncs - 1) as u32 + duration;
            self.average_sync_duration = total / self.successful_syncs as u32;
        }
    }

    /// A drain was cancelled
    pub fn record_sync_failure(&mut self, confirmed: usize) {
        self.actions_confirmed += confirmed as u64;
        self.last_sync_start = None;
        self.failed_syncs += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_syncs == 0 {
            0.0
        } else {
            self.successful_syncs as f64 / self.total_syncs as f64
        }
    }
}
