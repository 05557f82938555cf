//! # todosync Testkit
//!
//! Test utilities for todosync.
//!
//! This crate provides:
//! - Property-based test generators using proptest
//! - Fixtures: sample records, seeded stores, a loopback test server
//! - A harness that drives a sync run to completion
//! - Wire-format test vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use todosync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn syncs_against_server() {
//!     let server = TestServer::start();
//!     let orchestrator = SyncOrchestrator::new(server.sync_config(1), MemoryStore::new());
//!     let (result, _events) = run_automatic(&orchestrator, ConflictPolicy::PreferRemote).await;
//!     assert!(result.is_ok());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use vectors::*;
