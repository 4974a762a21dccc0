//! # Background Sync Service
//!
//! Spawned task that keeps the coordinator in step with the network monitor:
//! it restores or drops connectivity on every monitor change, drains when
//! writes are queued while online and wakes up at the earliest retry
//! deadline. It waits on channels and timers only.

use super::network_monitor::NetworkStatus;
use super::{NetworkMonitor, SyncCoordinator, SyncPhase};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle of the background sync task
#[derive(Debug)]
pub struct SyncService {
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SyncService {
    /// Spawn the service on the current runtime
    pub fn start(coordinator: Arc<SyncCoordinator>, monitor: &NetworkMonitor) -> Self {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(coordinator, monitor.subscribe(), shutdown.clone()));
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the service and wait for the task to finish
    ///
    /// Stopping takes the coordinator offline; a running drain is cancelled
    /// and its in-flight action stays queued.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("[SyncService] task failed: {}", e);
            }
        }
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    coordinator: Arc<SyncCoordinator>,
    mut network: watch::Receiver<NetworkStatus>,
    shutdown: CancellationToken,
) {
    tracing::info!("[SyncService] started");
    loop {
        let online = *network.borrow_and_update() == NetworkStatus::Online;
        let phase = coordinator.phase();

        if online && phase == SyncPhase::Offline {
            let work = coordinator.connectivity_restored();
            if watch_while(&coordinator, &mut network, &shutdown, work).await.is_break() {
                break;
            }
            continue;
        }
        if !online && phase.is_online() {
            coordinator.connectivity_lost();
        }

        let retry_in = if online { coordinator.next_retry_delay() } else { None };
        let drain = tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = network.changed() => {
                if changed.is_err() {
                    break;
                }
                false
            }
            _ = coordinator.work_signal().notified(), if online => true,
            _ = tokio::time::sleep(retry_in.unwrap_or_default()), if retry_in.is_some() => true,
        };

        if drain {
            let work = coordinator.sync_now();
            if watch_while(&coordinator, &mut network, &shutdown, work).await.is_break() {
                break;
            }
        }
    }
    coordinator.connectivity_lost();
    tracing::info!("[SyncService] stopped");
}

/// Drive `work` to completion while reacting to connectivity loss and shutdown
///
/// The drain is never dropped mid-call; going offline cancels its token and
/// the drain winds down on its own.
async fn watch_while<F>(
    coordinator: &SyncCoordinator,
    network: &mut watch::Receiver<NetworkStatus>,
    shutdown: &CancellationToken,
    work: F,
) -> ControlFlow<()>
where
    F: Future,
{
    tokio::pin!(work);
    let mut stopping = false;
    loop {
        tokio::select! {
            _ = &mut work => {
                return if stopping { ControlFlow::Break(()) } else { ControlFlow::Continue(()) };
            }
            _ = shutdown.cancelled(), if !stopping => {
                stopping = true;
                coordinator.connectivity_lost();
            }
            changed = network.changed(), if !stopping => match changed {
                Ok(()) => {
                    if *network.borrow() == NetworkStatus::Offline {
                        coordinator.connectivity_lost();
                    }
                }
                Err(_) => {
                    stopping = true;
                    coordinator.connectivity_lost();
                }
            },
        }
    }
}
