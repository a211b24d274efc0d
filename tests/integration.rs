//! Integration test entry point.
//!
//! This file serves as the entry point for all integration tests.
//! Individual test modules are in tests/integration/.
//!
//! Run all integration tests:
//!   cargo test --test integration
//!
//! Run specific test module:
//!   cargo test --test integration infoflow

#[path = "integration/common.rs"]
mod common;

#[path = "integration/permmap_tests.rs"]
mod permmap_tests;

#[path = "integration/infoflow_tests.rs"]
mod infoflow_tests;

#[path = "integration/dta_tests.rs"]
mod dta_tests;

#[path = "integration/query_tests.rs"]
mod query_tests;

#[path = "integration/checker_tests.rs"]
mod checker_tests;

#[path = "integration/diff_tests.rs"]
mod diff_tests;
