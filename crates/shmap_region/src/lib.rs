//! # shmap region
//!
//! A contiguous byte region mapped into the address space, either backed by
//! a file (durable, shareable across processes) or by anonymous memory.
//!
//! This crate is the lowest layer of shmap. A region is an **opaque byte
//! arena**: it knows nothing about segments, entries or records. It offers
//! bounds-checked byte copies and naturally aligned atomic accessors at byte
//! offsets, which is everything the store needs to lay out its own format.
//!
//! ## Design Principles
//!
//! - Callers address memory by offset, never by pointer
//! - Every access is bounds checked; atomics are alignment checked
//! - All `unsafe` code of the workspace lives here
//! - Regions are `Send + Sync` and shared through `Arc`
//!
//! ## Example
//!
//! ```rust
//! use shmap_region::MappedRegion;
//! use std::sync::atomic::Ordering;
//!
//! let region = MappedRegion::anonymous(4096).unwrap();
//! region.write(16, b"hello").unwrap();
//! assert_eq!(region.read_vec(16, 5).unwrap(), b"hello");
//!
//! let counter = region.atomic_u64(64).unwrap();
//! counter.fetch_add(1, Ordering::AcqRel);
//! assert_eq!(counter.load(Ordering::Acquire), 1);
//! ```

#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

mod error;
mod region;

pub use error::{RegionError, RegionResult};
pub use region::MappedRegion;
