//! Change notification tests
