//! The typed map facade and its live collection views.

mod iter;
mod shared_map;
mod views;

pub use iter::{EntryIter, KeyIter, MapEntry, ValueIter};
pub use shared_map::SharedMap;
pub use views::{EntrySet, KeySet, ValuesView};
