//! Mock server helpers for integration tests
//!
//! Wraps a `wiremock` server standing in for the REST backend.

use estate_sync::remote::{Credentials, HttpRemote};
use std::time::Duration;
use wiremock::MockServer;

/// Token the mock backend expects
pub const TEST_TOKEN: &str = "test-token";

/// Mock backend and an adapter pointed at it
pub struct MockBackend {
    pub server: MockServer,
    pub remote: HttpRemote,
}

impl MockBackend {
    /// Start a backend; the adapter carries `TEST_TOKEN`
    pub async fn start() -> Self {
        Self::start_with(Credentials::with_token(TEST_TOKEN), Duration::from_secs(2)).await
    }

    pub async fn start_with(credentials: Credentials, timeout: Duration) -> Self {
        let server = MockServer::start().await;
        let remote = HttpRemote::new(&server.uri(), credentials, timeout).expect("mock server URI is valid");
        Self { server, remote }
    }
}
