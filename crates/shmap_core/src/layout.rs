//! Byte layout of a store region.
//!
//! ```text
//! | file header (64) | segment 0 | segment 1 | ... | segment N-1 |
//!
//! segment:
//! | segment header (64) | index (index_capacity * 4) | slot 0 | slot 1 | ... |
//!
//! slot:
//! | flags (4) | key_len (4) | value_len (4) | next_free (4) | hash (8) | key area | value area |
//! ```
//!
//! The file header records the full geometry so that a process opening an
//! existing file can verify it was created with a compatible configuration.
//! All multi-byte header fields are little endian; words touched by atomics
//! (locks, counters, index cells, slot header words) use native byte order.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use shmap_region::MappedRegion;
use std::sync::atomic::Ordering;

/// Size of the file header at the start of the region.
pub(crate) const FILE_HEADER_SIZE: usize = 64;
/// Size of each segment header.
pub(crate) const SEGMENT_HEADER_SIZE: usize = 64;
/// Size of each slot header preceding the key and value areas.
pub(crate) const SLOT_HEADER_SIZE: usize = 24;
/// Width of one index cell.
pub(crate) const INDEX_CELL_SIZE: usize = 4;
/// Every segment holds at least this many slots.
pub(crate) const MIN_SEGMENT_SLOTS: usize = 8;

const MAGIC: [u8; 8] = *b"SHMAP\0\0\x01";
const FORMAT_VERSION: u32 = 1;
const HEADER_READY: u32 = 1;

// File header field offsets.
const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_STATE: usize = 12;
const OFF_SEGMENTS: usize = 16;
const OFF_SLOTS: usize = 20;
const OFF_MAX_KEY: usize = 24;
const OFF_ENTRY_SIZE: usize = 28;
const OFF_INDEX_CAPACITY: usize = 32;
const OFF_SLOT_SIZE: usize = 36;
const OFF_TOTAL_LEN: usize = 40;

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Geometry of a store region, derived from a [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLayout {
    /// Number of segments (a power of two).
    pub segments: usize,
    /// Fixed-size slots per segment.
    pub slots_per_segment: usize,
    /// Cells in each segment's index (a power of two).
    pub index_capacity: usize,
    /// Configured maximum key size.
    pub max_key_size: usize,
    /// Configured maximum value size.
    pub entry_size: usize,
    /// Bytes reserved for a key inside a slot.
    pub key_capacity: usize,
    /// Bytes reserved for a value inside a slot.
    pub value_capacity: usize,
    /// Total bytes of one slot.
    pub slot_size: usize,
    /// Total bytes of one segment.
    pub segment_size: usize,
    /// Total bytes of the region.
    pub total_len: usize,
}

impl StoreLayout {
    /// Computes the layout for a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the configuration is invalid
    /// or the resulting region would not be addressable.
    pub fn from_config(config: &Config) -> StoreResult<Self> {
        config.validate()?;

        let segments = config.segment_count();
        let too_large = || StoreError::invalid_config("configured store is too large to map");

        let planned = usize::try_from(config.entries)
            .ok()
            .and_then(|e| e.checked_mul(3))
            .map(|e| e / 2)
            .ok_or_else(too_large)?;
        let slots_per_segment = planned.div_ceil(segments).max(MIN_SEGMENT_SLOTS);
        if slots_per_segment >= u32::MAX as usize {
            return Err(too_large());
        }

        let index_capacity = (slots_per_segment * 2).next_power_of_two();
        let key_capacity = align_up(config.max_key_size, 8);
        let value_capacity = align_up(config.entry_size, 8);
        let slot_size = SLOT_HEADER_SIZE + key_capacity + value_capacity;
        if index_capacity > u32::MAX as usize || slot_size > u32::MAX as usize {
            return Err(too_large());
        }

        let segment_size = slot_size
            .checked_mul(slots_per_segment)
            .and_then(|s| s.checked_add(SEGMENT_HEADER_SIZE + index_capacity * INDEX_CELL_SIZE))
            .map(|s| align_up(s, 64))
            .ok_or_else(too_large)?;
        let total_len = segment_size
            .checked_mul(segments)
            .and_then(|s| s.checked_add(FILE_HEADER_SIZE))
            .ok_or_else(too_large)?;

        Ok(Self {
            segments,
            slots_per_segment,
            index_capacity,
            max_key_size: config.max_key_size,
            entry_size: config.entry_size,
            key_capacity,
            value_capacity,
            slot_size,
            segment_size,
            total_len,
        })
    }

    /// Byte offset of segment `index` within the region.
    #[must_use]
    pub fn segment_offset(&self, index: usize) -> usize {
        FILE_HEADER_SIZE + index * self.segment_size
    }

    /// Byte offset of the first slot relative to a segment's start.
    #[must_use]
    pub(crate) fn slots_offset(&self) -> usize {
        SEGMENT_HEADER_SIZE + self.index_capacity * INDEX_CELL_SIZE
    }

    /// Returns `true` if no header was ever completed in `region`.
    ///
    /// That is the case when the magic field is still zeroed, or when the
    /// magic was written but the ready flag never was. Any other content is
    /// a header to verify.
    pub(crate) fn is_unformatted(region: &MappedRegion) -> StoreResult<bool> {
        if region.bytes_equal(OFF_MAGIC, &[0u8; 8])? {
            return Ok(true);
        }
        let ready = region.atomic_u32(OFF_STATE)?.load(Ordering::Acquire) == HEADER_READY;
        Ok(!ready && region.bytes_equal(OFF_MAGIC, &MAGIC)?)
    }

    /// Writes the file header describing this layout.
    ///
    /// The ready flag is published last, so a reader that observes it also
    /// observes the geometry fields.
    pub(crate) fn write_header(&self, region: &MappedRegion) -> StoreResult<()> {
        region.write(OFF_MAGIC, &MAGIC)?;
        region.write(OFF_VERSION, &FORMAT_VERSION.to_le_bytes())?;
        region.write(OFF_SEGMENTS, &(self.segments as u32).to_le_bytes())?;
        region.write(OFF_SLOTS, &(self.slots_per_segment as u32).to_le_bytes())?;
        region.write(OFF_MAX_KEY, &(self.max_key_size as u32).to_le_bytes())?;
        region.write(OFF_ENTRY_SIZE, &(self.entry_size as u32).to_le_bytes())?;
        region.write(OFF_INDEX_CAPACITY, &(self.index_capacity as u32).to_le_bytes())?;
        region.write(OFF_SLOT_SIZE, &(self.slot_size as u32).to_le_bytes())?;
        region.write(OFF_TOTAL_LEN, &(self.total_len as u64).to_le_bytes())?;
        region
            .atomic_u32(OFF_STATE)?
            .store(HEADER_READY, Ordering::Release);
        Ok(())
    }

    /// Checks that the header in `region` describes exactly this layout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IncompatibleLayout`] on any mismatch.
    pub(crate) fn verify_header(&self, region: &MappedRegion) -> StoreResult<()> {
        if !region.bytes_equal(OFF_MAGIC, &MAGIC)? {
            return Err(StoreError::incompatible_layout("bad magic"));
        }

        let read_u32 = |offset: usize| -> StoreResult<u32> {
            let mut buf = [0u8; 4];
            region.read(offset, &mut buf)?;
            Ok(u32::from_le_bytes(buf))
        };

        let version = read_u32(OFF_VERSION)?;
        if version != FORMAT_VERSION {
            return Err(StoreError::incompatible_layout(format!(
                "format version {version}, expected {FORMAT_VERSION}"
            )));
        }

        let fields = [
            ("segments", OFF_SEGMENTS, self.segments),
            ("slots per segment", OFF_SLOTS, self.slots_per_segment),
            ("max key size", OFF_MAX_KEY, self.max_key_size),
            ("entry size", OFF_ENTRY_SIZE, self.entry_size),
            ("index capacity", OFF_INDEX_CAPACITY, self.index_capacity),
            ("slot size", OFF_SLOT_SIZE, self.slot_size),
        ];
        for (name, offset, expected) in fields {
            let actual = read_u32(offset)? as usize;
            if actual != expected {
                return Err(StoreError::incompatible_layout(format!(
                    "{name} is {actual} in file, configuration expects {expected}"
                )));
            }
        }

        let mut buf = [0u8; 8];
        region.read(OFF_TOTAL_LEN, &mut buf)?;
        let total_len = u64::from_le_bytes(buf);
        if total_len != self.total_len as u64 {
            return Err(StoreError::incompatible_layout(format!(
                "region length is {total_len} in file, configuration expects {}",
                self.total_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tutorial_geometry() {
        let config = Config::new().entries(10).min_segments(128).entry_size(24);
        let layout = StoreLayout::from_config(&config).unwrap();

        assert_eq!(layout.segments, 128);
        assert_eq!(layout.slots_per_segment, MIN_SEGMENT_SLOTS);
        assert_eq!(layout.index_capacity, 16);
        assert_eq!(layout.value_capacity, 24);
        assert_eq!(layout.slot_size, SLOT_HEADER_SIZE + 64 + 24);
        assert_eq!(layout.segment_size % 64, 0);
        assert_eq!(
            layout.total_len,
            FILE_HEADER_SIZE + layout.segments * layout.segment_size
        );
    }

    #[test]
    fn slots_scale_with_entries() {
        let config = Config::new().entries(100_000).min_segments(16);
        let layout = StoreLayout::from_config(&config).unwrap();
        assert_eq!(layout.slots_per_segment, 9375);
        assert_eq!(layout.index_capacity, 32768);
        assert!(layout.index_capacity >= layout.slots_per_segment * 2);
    }

    #[test]
    fn slot_areas_are_word_aligned() {
        let config = Config::new().entry_size(13).max_key_size(5);
        let layout = StoreLayout::from_config(&config).unwrap();
        assert_eq!(layout.key_capacity, 8);
        assert_eq!(layout.value_capacity, 16);
        assert_eq!(layout.slot_size % 8, 0);
        assert_eq!(layout.slots_offset() % 8, 0);
    }

    #[test]
    fn header_round_trip() {
        let config = Config::new().entries(64).min_segments(4);
        let layout = StoreLayout::from_config(&config).unwrap();
        let region = MappedRegion::anonymous(layout.total_len).unwrap();

        assert!(StoreLayout::is_unformatted(&region).unwrap());
        layout.write_header(&region).unwrap();
        assert!(!StoreLayout::is_unformatted(&region).unwrap());
        layout.verify_header(&region).unwrap();
    }

    #[test]
    fn header_mismatch_detected() {
        let layout = StoreLayout::from_config(&Config::new().entries(64).min_segments(4)).unwrap();
        let other = StoreLayout::from_config(&Config::new().entries(64).min_segments(8)).unwrap();
        let region = MappedRegion::anonymous(layout.total_len.max(other.total_len)).unwrap();

        layout.write_header(&region).unwrap();
        let err = other.verify_header(&region).unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleLayout { .. }));
    }

    #[test]
    fn foreign_bytes_are_not_unformatted() {
        let layout = StoreLayout::from_config(&Config::new().entries(64).min_segments(4)).unwrap();
        let region = MappedRegion::anonymous(layout.total_len).unwrap();
        region.write(0, b"NOTSHMAP").unwrap();
        assert!(!StoreLayout::is_unformatted(&region).unwrap());
        assert!(matches!(
            layout.verify_header(&region),
            Err(StoreError::IncompatibleLayout { .. })
        ));
    }
}
