// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the ObjectStore reconciler.
//!
//! These tests drive the real reconciler WITHOUT a live Kubernetes cluster or
//! storage cluster. Records, the parent cluster and the provisioner are all
//! replaced with in-memory mocks that record what the reconciler did.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_create_reaches_ready
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Scenario tests**: Create, update, fail and recover a single store
//! - **Deletion tests**: Finalizer handling and teardown, including a missing
//!   parent cluster

mod deletion_tests;
mod scenario_tests;

// Re-export for use in tests
pub use mock_state::*;
