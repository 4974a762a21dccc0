//! Tracing setup for binaries and integration harnesses.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// `RUST_LOG` wins over `default_filter`. Calling this twice is harmless:
/// the second install fails and is ignored.
pub fn init_tracing(default_filter: &str) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .with_target(false)
        .try_init();
    if installed.is_ok() {
        tracing::debug!("[STARTUP] tracing initialized with filter {}", env_filter);
    }
}
