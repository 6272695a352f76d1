//! # relstate Testkit
//!
//! Test utilities for relstate.
//!
//! This crate provides:
//! - Fixture schemas (library, teams, self-referencing people)
//! - Property-based generators for operation sequences using proptest
//! - A replay harness that tracks expected row counts
//! - Concurrent session stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relstate_testkit::prelude::*;
//!
//! #[test]
//! fn books_have_authors() {
//!     let orm = library_orm();
//!     let session = orm.session(None).unwrap();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use stress::*;
