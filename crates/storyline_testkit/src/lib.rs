//! # Storyline Testkit
//!
//! Test utilities for Storyline.
//!
//! This crate provides:
//! - Sample stories and seeded catalogs
//! - In-memory and file-backed test engines
//! - Property-based generators using proptest
//! - Concurrent write/sync stress runs
//!
//! ## Usage
//!
//! ```
//! use storyline_protocol::DeltaSyncRequest;
//! use storyline_testkit::prelude::*;
//!
//! let catalog = TestCatalog::seeded(3);
//! let response = catalog
//!     .reconciler()
//!     .reconcile(&DeltaSyncRequest::initial())
//!     .unwrap();
//! assert_eq!(response.stories.len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
