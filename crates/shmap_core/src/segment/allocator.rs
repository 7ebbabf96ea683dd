//! Fixed-size slot allocator for one segment.
//!
//! Slots are handed out from a free list first and then from a bump pointer
//! over never-used slots. Both live in the segment header so every process
//! mapping the region shares one allocator state. Allocation and release are
//! O(1); slots all have the same size, so there is no fragmentation and no
//! compaction.

use crate::error::{StoreError, StoreResult};
use crate::layout::StoreLayout;
use crate::segment::lock::SegmentGuard;
use crate::segment::slot::Slot;
use shmap_region::MappedRegion;
use std::sync::atomic::Ordering;

/// Segment header offset of the free-list head (`slot + 1`, 0 = empty).
pub(crate) const OFF_FREE_HEAD: usize = 16;
/// Segment header offset of the first never-used slot.
pub(crate) const OFF_NEXT_UNUSED: usize = 20;

/// Hands out and reclaims slots of one segment.
pub(crate) struct EntryAllocator<'r> {
    region: &'r MappedRegion,
    layout: &'r StoreLayout,
    segment: usize,
    base: usize,
}

impl<'r> EntryAllocator<'r> {
    pub(crate) fn new(
        region: &'r MappedRegion,
        layout: &'r StoreLayout,
        segment: usize,
        base: usize,
    ) -> Self {
        Self {
            region,
            layout,
            segment,
            base,
        }
    }

    fn header(&self, field: usize) -> StoreResult<u32> {
        Ok(self
            .region
            .atomic_u32(self.base + field)?
            .load(Ordering::Relaxed))
    }

    fn set_header(&self, field: usize, value: u32) -> StoreResult<()> {
        self.region
            .atomic_u32(self.base + field)?
            .store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the slot at `index`.
    pub(crate) fn slot(&self, index: u32) -> Slot<'r> {
        let offset =
            self.base + self.layout.slots_offset() + index as usize * self.layout.slot_size;
        Slot::new(self.region, self.layout, offset)
    }

    /// Number of slots that have ever been handed out.
    pub(crate) fn high_water(&self) -> StoreResult<u32> {
        self.header(OFF_NEXT_UNUSED)
    }

    /// Reserves a slot able to hold `size_hint` value bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntryTooLarge`] if no slot can hold the value and
    /// [`StoreError::CapacityExceeded`] if the segment has no free slot.
    pub(crate) fn allocate(&self, _guard: &SegmentGuard<'_>, size_hint: usize) -> StoreResult<u32> {
        if size_hint > self.layout.entry_size {
            return Err(StoreError::EntryTooLarge {
                size: size_hint,
                max: self.layout.entry_size,
            });
        }

        let head = self.header(OFF_FREE_HEAD)?;
        if head != 0 {
            let index = head - 1;
            let next = self.slot(index).next_free()?;
            self.set_header(OFF_FREE_HEAD, next)?;
            return Ok(index);
        }

        let next_unused = self.header(OFF_NEXT_UNUSED)?;
        if next_unused as usize >= self.layout.slots_per_segment {
            return Err(StoreError::CapacityExceeded {
                segment: self.segment,
            });
        }
        self.set_header(OFF_NEXT_UNUSED, next_unused + 1)?;
        Ok(next_unused)
    }

    /// Returns a live slot to the free list.
    ///
    /// # Errors
    ///
    /// Freeing a slot that is not live is a programming error and reported as
    /// [`StoreError::InvalidOperation`].
    pub(crate) fn free(&self, _guard: &SegmentGuard<'_>, index: u32) -> StoreResult<()> {
        let slot = self.slot(index);
        if !slot.is_live()? {
            if cfg!(debug_assertions) {
                panic!("double free of slot {index} in segment {}", self.segment);
            }
            return Err(StoreError::invalid_operation(format!(
                "slot {index} of segment {} freed twice",
                self.segment
            )));
        }
        slot.set_live(false)?;
        slot.set_next_free(self.header(OFF_FREE_HEAD)?)?;
        self.set_header(OFF_FREE_HEAD, index + 1)
    }

    /// Forgets every allocation at once.
    pub(crate) fn reset(&self, _guard: &SegmentGuard<'_>) -> StoreResult<()> {
        for index in 0..self.high_water()? {
            self.slot(index).set_live(false)?;
        }
        self.set_header(OFF_FREE_HEAD, 0)?;
        self.set_header(OFF_NEXT_UNUSED, 0)
    }
}
