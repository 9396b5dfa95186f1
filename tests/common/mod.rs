//! Common test infrastructure
//!
//! Integration tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{ScanHarness, ASSIGNMENT_1_ID, TEACHER_ID};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_reminder() {
//!     let harness = ScanHarness::teacher();
//!     let (assignments, submissions) = harness.snapshot().await;
//!     harness.engine.scan(&assignments, &submissions).await;
//! }
//! ```

mod constants;
mod fixtures;

#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::*;
