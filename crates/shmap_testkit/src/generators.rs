//! Property-based test generators using proptest.

use proptest::prelude::*;

/// A single map operation on small integer keys and byte values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOp {
    /// `put(key, value)`.
    Put(u32, Vec<u8>),
    /// `remove(key)`.
    Remove(u32),
    /// `remove(key, expected)`.
    RemoveIf(u32, Vec<u8>),
    /// `replace(key, value)`.
    Replace(u32, Vec<u8>),
    /// `replace(key, expected, value)`.
    ReplaceIf(u32, Vec<u8>, Vec<u8>),
    /// `get(key)`.
    Get(u32),
    /// `clear()`.
    Clear,
}

/// Strategy for keys drawn from a small range, so operations collide often.
pub fn key_strategy(max_key: u32) -> impl Strategy<Value = u32> {
    0..max_key
}

/// Strategy for values of at most `max_len` bytes.
pub fn value_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for a single operation. `Clear` is rare.
pub fn map_op_strategy(max_key: u32, max_len: usize) -> impl Strategy<Value = MapOp> {
    let key = move || key_strategy(max_key);
    let value = move || value_strategy(max_len);
    prop_oneof![
        8 => (key(), value()).prop_map(|(k, v)| MapOp::Put(k, v)),
        4 => key().prop_map(MapOp::Remove),
        2 => (key(), value()).prop_map(|(k, v)| MapOp::RemoveIf(k, v)),
        2 => (key(), value()).prop_map(|(k, v)| MapOp::Replace(k, v)),
        2 => (key(), value(), value()).prop_map(|(k, e, v)| MapOp::ReplaceIf(k, e, v)),
        4 => key().prop_map(MapOp::Get),
        1 => Just(MapOp::Clear),
    ]
}

/// Strategy for a sequence of operations.
pub fn map_ops_strategy(
    max_key: u32,
    max_len: usize,
    len: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<MapOp>> {
    prop::collection::vec(map_op_strategy(max_key, max_len), len)
}

/// Strategy for string keys up to `max_len` bytes.
pub fn string_key_strategy(max_len: usize) -> impl Strategy<Value = String> {
    prop::string::string_regex(&format!("[a-zA-Z0-9:_]{{1,{max_len}}}"))
        .expect("Invalid regex")
}
