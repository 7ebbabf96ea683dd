//! Zero-copy value views.
//!
//! A [`Schema`] names the fields of a fixed-size record and their offsets.
//! Schemas are registered once per map in a [`SchemaRegistry`]; every
//! [`ValueView`] created from a registered schema shares the same layout and
//! binds it to an entry's value bytes in the mapped region.

mod registry;
mod schema;
mod value_view;
mod values;

pub use registry::SchemaRegistry;
pub use schema::{Field, FieldId, FieldType, FieldValue, Schema, SchemaBuilder};
pub use value_view::{AsField, ValueView};
pub use values::{IntValue, LongValue, ValueRecord};
