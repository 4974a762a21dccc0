//! Integration tests
//!
//! End-to-end behaviour of the engine over in-memory, file-backed and
//! mocked HTTP backends

mod http_remote_test;
mod persistence_test;
mod realtime;
mod scenarios_test;
