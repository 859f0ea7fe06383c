//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No blocking I/O in the socket driver or transports
//! - No thread sleeps on the async path
//!
//! These tests are designed to catch violations early in the development cycle.

use std::path::PathBuf;

/// Workspace root, resolved from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}
