//! # shmap core
//!
//! A segmented, memory-mapped concurrent hash map.
//!
//! Keys and values live as raw byte records inside one mapped region, which
//! may be anonymous memory or a file shared by several processes. The region
//! is split into a fixed number of segments; each segment has its own lock,
//! an open-addressing index and a pool of fixed-size slots.
//!
//! This crate provides:
//! - [`SegmentedStore`]: routing of encoded keys to [`Segment`]s
//! - [`SharedMap`]: a typed map with live key, value and entry views
//! - [`ValueView`]: zero-copy field access with atomic add and compare-and-swap
//! - [`StateMachineData`]: a record-level state machine built on those atomics
//!
//! ## Example
//!
//! ```rust,ignore
//! use shmap_core::{Config, LongValue, SharedMap};
//!
//! let map: SharedMap<String, String> =
//!     SharedMap::open(Config::new().entries(1024).path("/tmp/counters.shm"))?;
//!
//! let hits: LongValue = map.acquire_record("hits")?;
//! hits.add_and_get(1)?;
//! map.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod codec;
mod config;
mod error;
mod hash;
mod layout;
mod map;
mod segment;
mod statemachine;
mod stats;
mod store;
mod view;

pub use backoff::Backoff;
pub use codec::{Decode, Encode};
pub use config::{Config, MAX_SEGMENTS};
pub use error::{StoreError, StoreResult};
pub use hash::hash_key;
pub use layout::StoreLayout;
pub use map::{EntryIter, EntrySet, KeyIter, KeySet, MapEntry, SharedMap, ValueIter, ValuesView};
pub use segment::{EntryLocation, RawEntry, Segment};
pub use statemachine::{MachineState, StateMachineData, StateMachineProcessor};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::SegmentedStore;
pub use view::{
    AsField, Field, FieldId, FieldType, FieldValue, IntValue, LongValue, Schema, SchemaBuilder,
    SchemaRegistry, ValueRecord, ValueView,
};

pub use shmap_region::{MappedRegion, RegionError};
