//! # shmap testkit
//!
//! Test utilities for shmap.
//!
//! This crate provides:
//! - Test fixtures: anonymous and temp-file maps, pre-populated scenarios
//! - Property-based generators for map operations
//! - A model harness that mirrors every operation into a `HashMap`
//! - Concurrency stress helpers
//! - Hash test vectors shared with other implementations of the file format
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shmap_testkit::prelude::*;
//!
//! #[test]
//! fn counts() {
//!     with_temp_map::<String, String, _, _>(|map| {
//!         map.put("a", "1").unwrap();
//!         assert_eq!(map.len().unwrap(), 1);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
pub use vectors::*;
