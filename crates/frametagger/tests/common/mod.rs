//! Shared test utilities for frametagger integration tests.
//!
//! - `TestHarness`: temp library, job manager and polling helpers
//! - image fixtures generated in memory

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::TestHarness;
