//! # Network Monitor
//!
//! Connectivity signal fed by the host environment. The host calls
//! `set_online` on every transition; the background sync service waits on
//! `subscribe()` and never polls.

use tokio::sync::watch;

/// Network connectivity status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Connectivity signal
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl NetworkMonitor {
    /// Monitor starting in `initial`
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Report a connectivity change; repeated reports of the same status are ignored
    pub fn set_status(&self, status: NetworkStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!("[Network] connectivity {:?}", status);
        }
    }

    /// Report connectivity as a flag
    pub fn set_online(&self, online: bool) {
        self.set_status(if online { NetworkStatus::Online } else { NetworkStatus::Offline });
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.get_status() == NetworkStatus::Online
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Offline)
    }
}
