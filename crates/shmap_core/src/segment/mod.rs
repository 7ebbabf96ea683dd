//! Segments: independently locked shards of the key space.
//!
//! ## Segment Format
//!
//! ```text
//! | lock (4) | reserved (4) | live count (8) | free head (4) | next unused (4) | reserved (40) |
//! | index cells (index_capacity * 4) |
//! | slot 0 | slot 1 | ... | slot N-1 |
//! ```
//!
//! Every structural change (insert, remove, value rewrite) happens while the
//! segment's lock word is held. The live count is updated in the same
//! critical section and read without the lock by `len()`.

mod allocator;
mod index;
pub(crate) mod lock;
mod slot;

use crate::error::{StoreError, StoreResult};
use crate::layout::StoreLayout;
use allocator::EntryAllocator;
use index::SegmentIndex;
use lock::SegmentGuard;
use shmap_region::MappedRegion;
use slot::Slot;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const OFF_LOCK: usize = 0;
const OFF_COUNT: usize = 8;

/// Where a live entry's value lives in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    segment: usize,
    slot: u32,
    value_offset: usize,
    value_len: usize,
    capacity: usize,
}

impl EntryLocation {
    /// Segment owning the entry.
    #[must_use]
    pub fn segment(&self) -> usize {
        self.segment
    }

    /// Slot index within the segment.
    #[must_use]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Absolute byte offset of the value in the region.
    #[must_use]
    pub fn value_offset(&self) -> usize {
        self.value_offset
    }

    /// Current value length in bytes.
    #[must_use]
    pub fn value_len(&self) -> usize {
        self.value_len
    }

    /// Largest value the entry may hold, the configured entry size. Views
    /// may not extend beyond this.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A live entry copied out of a segment while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Slot index the entry was found in.
    pub slot: u32,
    /// Encoded key bytes.
    pub key: Vec<u8>,
    /// Encoded value bytes.
    pub value: Vec<u8>,
}

/// One shard of the store: a lock, an index and a slot pool.
pub struct Segment {
    number: usize,
    base: usize,
    layout: StoreLayout,
    region: Arc<MappedRegion>,
}

impl Segment {
    pub(crate) fn new(number: usize, layout: StoreLayout, region: Arc<MappedRegion>) -> Self {
        Self {
            number,
            base: layout.segment_offset(number),
            layout,
            region,
        }
    }

    /// Position of this segment in the store.
    #[must_use]
    pub fn number(&self) -> usize {
        self.number
    }

    fn lock(&self) -> StoreResult<SegmentGuard<'_>> {
        Ok(lock::lock(self.region.atomic_u32(self.base + OFF_LOCK)?))
    }

    fn allocator(&self) -> EntryAllocator<'_> {
        EntryAllocator::new(&self.region, &self.layout, self.number, self.base)
    }

    fn index(&self) -> SegmentIndex<'_> {
        SegmentIndex::new(
            &self.region,
            self.base + crate::layout::SEGMENT_HEADER_SIZE,
            self.layout.index_capacity,
        )
    }

    fn count(&self) -> StoreResult<&std::sync::atomic::AtomicU64> {
        Ok(self.region.atomic_u64(self.base + OFF_COUNT)?)
    }

    fn check_key(&self, key: &[u8]) -> StoreResult<()> {
        if key.len() > self.layout.max_key_size {
            return Err(StoreError::KeyTooLarge {
                size: key.len(),
                max: self.layout.max_key_size,
            });
        }
        Ok(())
    }

    fn check_value(&self, len: usize) -> StoreResult<()> {
        if len > self.layout.entry_size {
            return Err(StoreError::EntryTooLarge {
                size: len,
                max: self.layout.entry_size,
            });
        }
        Ok(())
    }

    fn location(&self, index: u32, slot: &Slot<'_>) -> StoreResult<EntryLocation> {
        Ok(EntryLocation {
            segment: self.number,
            slot: index,
            value_offset: slot.value_offset(),
            value_len: slot.value_len()?,
            capacity: self.layout.entry_size,
        })
    }

    fn lookup(
        &self,
        guard: &SegmentGuard<'_>,
        key: &[u8],
        hash: u64,
    ) -> StoreResult<Option<(usize, u32)>> {
        let alloc = self.allocator();
        self.index()
            .find(guard, hash, |index| alloc.slot(index).matches(key, hash))
    }

    fn insert(
        &self,
        guard: &SegmentGuard<'_>,
        key: &[u8],
        hash: u64,
        value: &[u8],
    ) -> StoreResult<u32> {
        let alloc = self.allocator();
        let index = match alloc.allocate(guard, value.len()) {
            Ok(index) => index,
            Err(err) => {
                if err.is_capacity() {
                    tracing::warn!(segment = self.number, "segment slot pool exhausted");
                }
                return Err(err);
            }
        };
        let slot = alloc.slot(index);
        slot.write_key(key, hash)?;
        slot.write_value(value)?;
        slot.set_live(true)?;
        self.index().insert(guard, hash, index)?;
        self.count()?.fetch_add(1, Ordering::Release);
        Ok(index)
    }

    fn delete(&self, guard: &SegmentGuard<'_>, cell: usize, index: u32) -> StoreResult<()> {
        let alloc = self.allocator();
        self.index()
            .remove_at(guard, cell, |other| alloc.slot(other).hash())?;
        alloc.free(guard, index)?;
        self.count()?.fetch_sub(1, Ordering::Release);
        Ok(())
    }

    /// Number of live entries in this segment.
    ///
    /// Read without taking the lock.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.count()?.load(Ordering::Acquire) as usize)
    }

    /// Returns `true` if the segment holds no live entries.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Locates the entry for `key`, if present.
    pub fn get(&self, key: &[u8], hash: u64) -> StoreResult<Option<EntryLocation>> {
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((_, index)) => Ok(Some(self.location(index, &self.allocator().slot(index))?)),
            None => Ok(None),
        }
    }

    /// Locates the entry for `key` and makes its value at least `min_len`
    /// bytes long, zero-filling the extension.
    ///
    /// Used before binding a view so the view never covers bytes beyond the
    /// stored value.
    pub fn get_sized(
        &self,
        key: &[u8],
        hash: u64,
        min_len: usize,
    ) -> StoreResult<Option<EntryLocation>> {
        self.check_value(min_len)?;
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((_, index)) => {
                let slot = self.allocator().slot(index);
                let len = slot.value_len()?;
                if len < min_len {
                    slot.zero_value(len, min_len)?;
                }
                Ok(Some(self.location(index, &slot)?))
            }
            None => Ok(None),
        }
    }

    /// Returns `true` if `key` has a live entry.
    pub fn contains(&self, key: &[u8], hash: u64) -> StoreResult<bool> {
        let guard = self.lock()?;
        Ok(self.lookup(&guard, key, hash)?.is_some())
    }

    /// Copies the value stored for `key`.
    pub fn read(&self, key: &[u8], hash: u64) -> StoreResult<Option<Vec<u8>>> {
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((_, index)) => Ok(Some(self.allocator().slot(index).read_value()?)),
            None => Ok(None),
        }
    }

    /// Returns the entry for `key`, creating a zero-filled one of `init_len`
    /// value bytes if absent.
    ///
    /// Concurrent callers for the same absent key serialize on the segment
    /// lock: the first one allocates, the others find its entry. An existing
    /// entry shorter than `init_len` is extended with zeros.
    pub fn acquire(&self, key: &[u8], hash: u64, init_len: usize) -> StoreResult<EntryLocation> {
        self.check_key(key)?;
        self.check_value(init_len)?;
        let guard = self.lock()?;
        let alloc = self.allocator();

        let index = match self.lookup(&guard, key, hash)? {
            Some((_, index)) => {
                let slot = alloc.slot(index);
                let len = slot.value_len()?;
                if len < init_len {
                    slot.zero_value(len, init_len)?;
                }
                index
            }
            None => {
                let index = self.insert(&guard, key, hash, &[])?;
                alloc.slot(index).zero_value(0, init_len)?;
                index
            }
        };
        self.location(index, &alloc.slot(index))
    }

    /// Inserts or overwrites the value for `key`.
    ///
    /// Returns the previous value when `return_previous` is set and one existed.
    pub fn put(
        &self,
        key: &[u8],
        hash: u64,
        value: &[u8],
        return_previous: bool,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.check_key(key)?;
        self.check_value(value.len())?;
        let guard = self.lock()?;

        match self.lookup(&guard, key, hash)? {
            Some((_, index)) => {
                let slot = self.allocator().slot(index);
                let previous = if return_previous {
                    Some(slot.read_value()?)
                } else {
                    None
                };
                slot.write_value(value)?;
                Ok(previous)
            }
            None => {
                self.insert(&guard, key, hash, value)?;
                Ok(None)
            }
        }
    }

    /// Removes `key`. Returns whether a live entry existed.
    pub fn remove(&self, key: &[u8], hash: u64) -> StoreResult<bool> {
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((cell, index)) => {
                self.delete(&guard, cell, index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes `key` and returns the value it held.
    pub fn take(&self, key: &[u8], hash: u64) -> StoreResult<Option<Vec<u8>>> {
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((cell, index)) => {
                let value = self.allocator().slot(index).read_value()?;
                self.delete(&guard, cell, index)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Removes `key` only if its value currently equals `expected`.
    pub fn remove_if_matches(&self, key: &[u8], hash: u64, expected: &[u8]) -> StoreResult<bool> {
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((cell, index)) if self.allocator().slot(index).value_equals(expected)? => {
                self.delete(&guard, cell, index)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Overwrites the value of an existing `key`, returning the old value.
    ///
    /// Absent keys are left absent.
    pub fn replace(&self, key: &[u8], hash: u64, value: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_value(value.len())?;
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((_, index)) => {
                let slot = self.allocator().slot(index);
                let previous = slot.read_value()?;
                slot.write_value(value)?;
                Ok(Some(previous))
            }
            None => Ok(None),
        }
    }

    /// Overwrites the value of `key` only if it currently equals `expected`.
    pub fn replace_if_matches(
        &self,
        key: &[u8],
        hash: u64,
        expected: &[u8],
        value: &[u8],
    ) -> StoreResult<bool> {
        self.check_value(value.len())?;
        let guard = self.lock()?;
        match self.lookup(&guard, key, hash)? {
            Some((_, index)) => {
                let slot = self.allocator().slot(index);
                if !slot.value_equals(expected)? {
                    return Ok(false);
                }
                slot.write_value(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes every entry. Returns how many were removed.
    pub fn clear(&self) -> StoreResult<usize> {
        let guard = self.lock()?;
        let removed = self.len()?;
        self.index().clear(&guard)?;
        self.allocator().reset(&guard)?;
        self.count()?.store(0, Ordering::Release);
        Ok(removed)
    }

    /// Copies out the first live entry at slot `from` or later.
    pub fn next_entry(&self, from: u32) -> StoreResult<Option<RawEntry>> {
        let _guard = self.lock()?;
        let alloc = self.allocator();
        for index in from..alloc.high_water()? {
            let slot = alloc.slot(index);
            if slot.is_live()? {
                return Ok(Some(RawEntry {
                    slot: index,
                    key: slot.read_key()?,
                    value: slot.read_value()?,
                }));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("number", &self.number)
            .field("base", &self.base)
            .field("len", &self.len().ok())
            .finish_non_exhaustive()
    }
}
