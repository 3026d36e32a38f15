//! Test support module
//!
//! Shared fixtures and helpers for the integration tests.

#![allow(dead_code)]

pub mod helpers;

// Re-export rstest fixtures for convenient use in tests
pub mod fixtures;
