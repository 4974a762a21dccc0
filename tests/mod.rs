//! Test suite for estate-sync
//!
//! This module organizes all tests

pub mod integration;
