//! Open-addressing index from key hash to slot.
//!
//! Linear probing over `u32` cells holding `slot + 1` (0 = empty). Deletion
//! uses backward shifting, so the table never accumulates tombstones. The
//! capacity is at least twice the slot count, which keeps the load factor
//! at or below one half and guarantees a free cell for every live slot.

use crate::error::StoreResult;
use crate::hash::home_cell;
use crate::layout::INDEX_CELL_SIZE;
use crate::segment::lock::SegmentGuard;
use shmap_region::MappedRegion;
use std::sync::atomic::Ordering;

const EMPTY: u32 = 0;

pub(crate) struct SegmentIndex<'r> {
    region: &'r MappedRegion,
    base: usize,
    capacity: usize,
}

impl<'r> SegmentIndex<'r> {
    pub(crate) fn new(region: &'r MappedRegion, base: usize, capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            region,
            base,
            capacity,
        }
    }

    fn cell(&self, cell: usize) -> StoreResult<u32> {
        Ok(self
            .region
            .atomic_u32(self.base + cell * INDEX_CELL_SIZE)?
            .load(Ordering::Relaxed))
    }

    fn set_cell(&self, cell: usize, value: u32) -> StoreResult<()> {
        self.region
            .atomic_u32(self.base + cell * INDEX_CELL_SIZE)?
            .store(value, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    fn next(&self, cell: usize) -> usize {
        (cell + 1) & (self.capacity - 1)
    }

    /// Finds the cell whose slot satisfies `matches`, probing from `hash`'s home.
    ///
    /// Returns `(cell, slot)`.
    pub(crate) fn find<F>(
        &self,
        _guard: &SegmentGuard<'_>,
        hash: u64,
        mut matches: F,
    ) -> StoreResult<Option<(usize, u32)>>
    where
        F: FnMut(u32) -> StoreResult<bool>,
    {
        let mut cell = home_cell(hash, self.capacity);
        for _ in 0..self.capacity {
            let value = self.cell(cell)?;
            if value == EMPTY {
                return Ok(None);
            }
            if matches(value - 1)? {
                return Ok(Some((cell, value - 1)));
            }
            cell = self.next(cell);
        }
        Ok(None)
    }

    /// Registers `slot` under `hash`.
    ///
    /// The caller guarantees the key is not already present and that a free
    /// cell exists (the index is sized for that).
    pub(crate) fn insert(&self, _guard: &SegmentGuard<'_>, hash: u64, slot: u32) -> StoreResult<()> {
        let mut cell = home_cell(hash, self.capacity);
        while self.cell(cell)? != EMPTY {
            cell = self.next(cell);
        }
        self.set_cell(cell, slot + 1)
    }

    /// Empties `cell`, shifting later members of its probe run backwards.
    ///
    /// `hash_of` returns the stored hash of a slot, used to find each shifted
    /// entry's home cell.
    pub(crate) fn remove_at<H>(
        &self,
        _guard: &SegmentGuard<'_>,
        cell: usize,
        mut hash_of: H,
    ) -> StoreResult<()>
    where
        H: FnMut(u32) -> StoreResult<u64>,
    {
        let mut hole = cell;
        let mut probe = cell;
        loop {
            probe = self.next(probe);
            let value = self.cell(probe)?;
            if value == EMPTY {
                break;
            }
            let home = home_cell(hash_of(value - 1)?, self.capacity);
            // Entries whose home lies cyclically in (hole, probe] stay put.
            let stays = if hole <= probe {
                hole < home && home <= probe
            } else {
                hole < home || home <= probe
            };
            if !stays {
                self.set_cell(hole, value)?;
                hole = probe;
            }
        }
        self.set_cell(hole, EMPTY)
    }

    /// Empties every cell.
    pub(crate) fn clear(&self, _guard: &SegmentGuard<'_>) -> StoreResult<()> {
        self.region
            .fill(self.base, self.capacity * INDEX_CELL_SIZE, 0)?;
        Ok(())
    }
}
