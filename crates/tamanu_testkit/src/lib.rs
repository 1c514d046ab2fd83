//! # Tamanu Testkit
//!
//! Test utilities for the Tamanu sync metadata layer.
//!
//! This crate provides:
//! - Test fixtures, record builders and scenario helpers
//! - Property-based test generators using proptest
//! - A call-recording store with write delays and failure injection
//! - Cross-crate integration test helpers
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use tamanu_testkit::prelude::*;
//!
//! let test_db = scenarios::pending_encounters(3);
//! let encounters = test_db.model("encounters");
//! let pending = drain_upload_queue(&encounters, "encounter", 2).unwrap();
//! assert_eq!(pending.len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod recording;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::recording::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use recording::*;
pub use stress::*;
