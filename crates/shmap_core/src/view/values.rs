//! Typed records over a [`ValueView`].

use super::schema::{FieldId, FieldType, Schema};
use super::value_view::ValueView;
use crate::error::{StoreError, StoreResult};

/// A typed record stored as a map value and accessed in place.
///
/// Implementors describe their layout once through [`schema`](Self::schema)
/// and wrap a [`ValueView`] bound to that layout.
pub trait ValueRecord: Sized {
    /// The record layout.
    fn schema() -> Schema;

    /// Wraps a view whose schema is [`schema`](Self::schema).
    ///
    /// # Errors
    ///
    /// Fails if the view's schema lacks a field the record needs.
    fn from_view(view: ValueView) -> StoreResult<Self>;

    /// The underlying view.
    fn view(&self) -> &ValueView;

    /// Unwraps the underlying view, e.g. to reuse it for another key.
    fn into_view(self) -> ValueView;
}

fn single_field(view: &ValueView, ty: FieldType) -> StoreResult<FieldId> {
    let id = view.field_id("value")?;
    let actual = view
        .schema()
        .field_at(id)
        .map(|f| f.field_type())
        .ok_or_else(|| StoreError::unknown_field("value"))?;
    if actual != ty {
        return Err(StoreError::FieldTypeMismatch {
            field: "value".to_string(),
            expected: ty,
            actual,
        });
    }
    Ok(id)
}

/// A shared 64-bit counter.
#[derive(Debug, Clone)]
pub struct LongValue {
    view: ValueView,
    value: FieldId,
}

impl LongValue {
    /// Schema name used in the registry.
    pub const SCHEMA_NAME: &'static str = "LongValue";

    /// Reads the value.
    pub fn get(&self) -> StoreResult<i64> {
        self.view.get_i64(self.value)
    }

    /// Overwrites the value.
    pub fn set(&self, value: i64) -> StoreResult<()> {
        self.view.set_i64(self.value, value)
    }

    /// Atomically adds `delta` and returns the result.
    pub fn add_and_get(&self, delta: i64) -> StoreResult<i64> {
        self.view.add_and_get(self.value, delta)
    }

    /// Atomically replaces `expected` with `new`.
    pub fn compare_and_swap(&self, expected: i64, new: i64) -> StoreResult<bool> {
        self.view.compare_and_swap(self.value, expected, new)
    }
}

impl ValueRecord for LongValue {
    fn schema() -> Schema {
        Schema::packed(Self::SCHEMA_NAME, &[("value", FieldType::Int64)])
    }

    fn from_view(view: ValueView) -> StoreResult<Self> {
        let value = single_field(&view, FieldType::Int64)?;
        Ok(Self { view, value })
    }

    fn view(&self) -> &ValueView {
        &self.view
    }

    fn into_view(self) -> ValueView {
        self.view
    }
}

/// A shared 32-bit counter.
#[derive(Debug, Clone)]
pub struct IntValue {
    view: ValueView,
    value: FieldId,
}

impl IntValue {
    /// Schema name used in the registry.
    pub const SCHEMA_NAME: &'static str = "IntValue";

    /// Reads the value.
    pub fn get(&self) -> StoreResult<i32> {
        self.view.get_i32(self.value)
    }

    /// Overwrites the value.
    pub fn set(&self, value: i32) -> StoreResult<()> {
        self.view.set_i32(self.value, value)
    }

    /// Atomically adds `delta` (wrapping) and returns the result.
    pub fn add_and_get(&self, delta: i32) -> StoreResult<i32> {
        // Int32 arithmetic wraps within 32 bits, so the result always fits.
        let value = self.view.add_and_get(self.value, i64::from(delta))?;
        Ok(value as i32)
    }

    /// Atomically replaces `expected` with `new`.
    pub fn compare_and_swap(&self, expected: i32, new: i32) -> StoreResult<bool> {
        self.view
            .compare_and_swap(self.value, i64::from(expected), i64::from(new))
    }
}

impl ValueRecord for IntValue {
    fn schema() -> Schema {
        Schema::packed(Self::SCHEMA_NAME, &[("value", FieldType::Int32)])
    }

    fn from_view(view: ValueView) -> StoreResult<Self> {
        let value = single_field(&view, FieldType::Int32)?;
        Ok(Self { view, value })
    }

    fn view(&self) -> &ValueView {
        &self.view
    }

    fn into_view(self) -> ValueView {
        self.view
    }
}
