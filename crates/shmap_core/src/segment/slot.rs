//! Accessors for one fixed-size slot.

use crate::error::StoreResult;
use crate::layout::{StoreLayout, SLOT_HEADER_SIZE};
use shmap_region::MappedRegion;
use std::sync::atomic::Ordering;

const OFF_FLAGS: usize = 0;
const OFF_KEY_LEN: usize = 4;
const OFF_VALUE_LEN: usize = 8;
const OFF_NEXT_FREE: usize = 12;
const OFF_HASH: usize = 16;

const FLAG_LIVE: u32 = 0x01;

/// A slot at a fixed offset inside a segment.
#[derive(Clone, Copy)]
pub(crate) struct Slot<'r> {
    region: &'r MappedRegion,
    offset: usize,
    key_capacity: usize,
}

impl<'r> Slot<'r> {
    pub(crate) fn new(region: &'r MappedRegion, layout: &StoreLayout, offset: usize) -> Self {
        Self {
            region,
            offset,
            key_capacity: layout.key_capacity,
        }
    }

    fn word(&self, field: usize) -> StoreResult<u32> {
        Ok(self
            .region
            .atomic_u32(self.offset + field)?
            .load(Ordering::Acquire))
    }

    fn set_word(&self, field: usize, value: u32) -> StoreResult<()> {
        self.region
            .atomic_u32(self.offset + field)?
            .store(value, Ordering::Release);
        Ok(())
    }

    pub(crate) fn is_live(&self) -> StoreResult<bool> {
        Ok(self.word(OFF_FLAGS)? & FLAG_LIVE != 0)
    }

    pub(crate) fn set_live(&self, live: bool) -> StoreResult<()> {
        self.set_word(OFF_FLAGS, if live { FLAG_LIVE } else { 0 })
    }

    pub(crate) fn key_len(&self) -> StoreResult<usize> {
        Ok(self.word(OFF_KEY_LEN)? as usize)
    }

    pub(crate) fn value_len(&self) -> StoreResult<usize> {
        Ok(self.word(OFF_VALUE_LEN)? as usize)
    }

    pub(crate) fn set_value_len(&self, len: usize) -> StoreResult<()> {
        self.set_word(OFF_VALUE_LEN, len as u32)
    }

    /// Next slot in the free list, stored as `slot + 1` (0 ends the list).
    pub(crate) fn next_free(&self) -> StoreResult<u32> {
        self.word(OFF_NEXT_FREE)
    }

    pub(crate) fn set_next_free(&self, next: u32) -> StoreResult<()> {
        self.set_word(OFF_NEXT_FREE, next)
    }

    pub(crate) fn hash(&self) -> StoreResult<u64> {
        Ok(self
            .region
            .atomic_u64(self.offset + OFF_HASH)?
            .load(Ordering::Acquire))
    }

    pub(crate) fn key_offset(&self) -> usize {
        self.offset + SLOT_HEADER_SIZE
    }

    pub(crate) fn value_offset(&self) -> usize {
        self.key_offset() + self.key_capacity
    }

    /// Returns `true` if this slot holds exactly `key` with hash `hash`.
    pub(crate) fn matches(&self, key: &[u8], hash: u64) -> StoreResult<bool> {
        Ok(self.hash()? == hash
            && self.key_len()? == key.len()
            && self.region.bytes_equal(self.key_offset(), key)?)
    }

    pub(crate) fn read_key(&self) -> StoreResult<Vec<u8>> {
        Ok(self.region.read_vec(self.key_offset(), self.key_len()?)?)
    }

    pub(crate) fn read_value(&self) -> StoreResult<Vec<u8>> {
        Ok(self.region.read_vec(self.value_offset(), self.value_len()?)?)
    }

    pub(crate) fn value_equals(&self, expected: &[u8]) -> StoreResult<bool> {
        Ok(self.value_len()? == expected.len()
            && self.region.bytes_equal(self.value_offset(), expected)?)
    }

    /// Writes the key and hash of a freshly allocated slot.
    pub(crate) fn write_key(&self, key: &[u8], hash: u64) -> StoreResult<()> {
        self.region.write(self.key_offset(), key)?;
        self.set_word(OFF_KEY_LEN, key.len() as u32)?;
        self.region
            .atomic_u64(self.offset + OFF_HASH)?
            .store(hash, Ordering::Release);
        Ok(())
    }

    pub(crate) fn write_value(&self, value: &[u8]) -> StoreResult<()> {
        self.region.write(self.value_offset(), value)?;
        self.set_value_len(value.len())
    }

    /// Zeroes the value area from `from` up to `to` and sets the length to `to`.
    pub(crate) fn zero_value(&self, from: usize, to: usize) -> StoreResult<()> {
        if to > from {
            self.region.fill(self.value_offset() + from, to - from, 0)?;
        }
        self.set_value_len(to)
    }
}
