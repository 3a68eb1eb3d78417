//! Integration test crate for the feedwatch workspace.
//!
//! This crate has no library code. It only holds tests that drive the
//! monitor, the price harness and the lending protocol together.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p feedwatch-integration-tests
//! ```
