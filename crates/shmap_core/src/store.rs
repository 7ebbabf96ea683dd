//! The segmented store: one mapped region split into fixed segments.
//!
//! The store owns the region and routes every key to the segment chosen by
//! its hash. It works on encoded key and value bytes; typed access lives in
//! [`crate::map`].

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::hash::{hash_key, segment_for};
use crate::layout::StoreLayout;
use crate::segment::{EntryLocation, RawEntry, Segment};
use fs2::FileExt;
use shmap_region::MappedRegion;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

/// Owner of a mapped region and its segments.
pub struct SegmentedStore {
    region: Arc<MappedRegion>,
    layout: StoreLayout,
    segments: Vec<Segment>,
}

impl SegmentedStore {
    /// Creates or opens the store described by `config`.
    ///
    /// Without a path the store lives in anonymous memory and starts empty.
    /// With a path, an empty or missing file is initialized and an existing
    /// one is validated against the configured geometry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] for unusable configurations,
    /// [`StoreError::IncompatibleLayout`] if the file was created with a
    /// different geometry, or an I/O error.
    pub fn open(config: &Config) -> StoreResult<Self> {
        let layout = StoreLayout::from_config(config)?;
        let region = match config.backing_path() {
            Some(path) => Self::map_file(path, &layout, config.create_dirs)?,
            None => {
                let region = MappedRegion::anonymous(layout.total_len)?;
                layout.write_header(&region)?;
                region
            }
        };

        tracing::debug!(
            path = ?config.backing_path(),
            segments = layout.segments,
            slots_per_segment = layout.slots_per_segment,
            slot_size = layout.slot_size,
            total_len = layout.total_len,
            "opened segmented store"
        );

        let region = Arc::new(region);
        let segments = (0..layout.segments)
            .map(|n| Segment::new(n, layout, Arc::clone(&region)))
            .collect();
        Ok(Self {
            region,
            layout,
            segments,
        })
    }

    fn map_file(path: &Path, layout: &StoreLayout, create_dirs: bool) -> StoreResult<MappedRegion> {
        if create_dirs {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        // Held while the header is checked or written, so processes racing
        // to create the same file agree on one header.
        let lock = file.try_clone()?;
        lock.lock_exclusive()?;
        let result = Self::map_locked(file, path, layout);
        FileExt::unlock(&lock)?;
        result
    }

    fn map_locked(
        file: std::fs::File,
        path: &Path,
        layout: &StoreLayout,
    ) -> StoreResult<MappedRegion> {
        let existing = file.metadata()?.len();
        if existing != 0 && existing != layout.total_len as u64 {
            tracing::warn!(
                path = %path.display(),
                file_len = existing,
                expected = layout.total_len,
                "backing file size does not match configuration"
            );
            return Err(StoreError::incompatible_layout(format!(
                "file is {existing} bytes, configuration needs {}",
                layout.total_len
            )));
        }

        let region = MappedRegion::map_file(file, path, layout.total_len)?;
        if existing == 0 || StoreLayout::is_unformatted(&region)? {
            layout.write_header(&region)?;
            region.flush()?;
        } else if let Err(err) = layout.verify_header(&region) {
            tracing::warn!(path = %path.display(), error = %err, "rejected backing file");
            return Err(err);
        }
        Ok(region)
    }

    /// Returns the geometry of the store.
    #[must_use]
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Returns the mapped region.
    #[must_use]
    pub fn region(&self) -> &Arc<MappedRegion> {
        &self.region
    }

    /// Returns every segment in order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns segment `n`, if it exists.
    #[must_use]
    pub fn segment(&self, n: usize) -> Option<&Segment> {
        self.segments.get(n)
    }

    /// Returns the segment owning `key`, together with the key's hash.
    #[must_use]
    pub fn route(&self, key: &[u8]) -> (&Segment, u64) {
        let hash = hash_key(key);
        (&self.segments[segment_for(hash, self.segments.len())], hash)
    }

    /// Sums the live counts of all segments.
    ///
    /// No global lock is taken; concurrent mutations in different segments
    /// may be partially reflected.
    pub fn len(&self) -> StoreResult<usize> {
        self.segments
            .iter()
            .try_fold(0usize, |total, seg| Ok(total + seg.len()?))
    }

    /// Returns `true` if no segment holds a live entry.
    pub fn is_empty(&self) -> StoreResult<bool> {
        for seg in &self.segments {
            if !seg.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Locates `key`'s entry.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<EntryLocation>> {
        let (seg, hash) = self.route(key);
        seg.get(key, hash)
    }

    /// Locates `key`'s entry, extending its value to `min_len` zero bytes.
    pub fn get_sized(&self, key: &[u8], min_len: usize) -> StoreResult<Option<EntryLocation>> {
        let (seg, hash) = self.route(key);
        seg.get_sized(key, hash, min_len)
    }

    /// Copies `key`'s value.
    pub fn read(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let (seg, hash) = self.route(key);
        seg.read(key, hash)
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        let (seg, hash) = self.route(key);
        seg.contains(key, hash)
    }

    /// Returns `key`'s entry, creating a zeroed one of `init_len` bytes if absent.
    pub fn acquire(&self, key: &[u8], init_len: usize) -> StoreResult<EntryLocation> {
        let (seg, hash) = self.route(key);
        seg.acquire(key, hash, init_len)
    }

    /// Inserts or overwrites `key`.
    pub fn put(
        &self,
        key: &[u8],
        value: &[u8],
        return_previous: bool,
    ) -> StoreResult<Option<Vec<u8>>> {
        let (seg, hash) = self.route(key);
        seg.put(key, hash, value, return_previous)
    }

    /// Removes `key`, reporting whether it was present.
    pub fn remove(&self, key: &[u8]) -> StoreResult<bool> {
        let (seg, hash) = self.route(key);
        seg.remove(key, hash)
    }

    /// Removes `key`, returning its value.
    pub fn take(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let (seg, hash) = self.route(key);
        seg.take(key, hash)
    }

    /// Removes `key` if its value equals `expected`.
    pub fn remove_if_matches(&self, key: &[u8], expected: &[u8]) -> StoreResult<bool> {
        let (seg, hash) = self.route(key);
        seg.remove_if_matches(key, hash, expected)
    }

    /// Overwrites an existing `key`, returning its old value.
    pub fn replace(&self, key: &[u8], value: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let (seg, hash) = self.route(key);
        seg.replace(key, hash, value)
    }

    /// Overwrites `key` if its value equals `expected`.
    pub fn replace_if_matches(
        &self,
        key: &[u8],
        expected: &[u8],
        value: &[u8],
    ) -> StoreResult<bool> {
        let (seg, hash) = self.route(key);
        seg.replace_if_matches(key, hash, expected, value)
    }

    /// Returns the first live entry at or after `(segment, slot)`.
    ///
    /// Segments are visited in order; each is locked only while it is scanned.
    pub fn next_entry(&self, segment: usize, slot: u32) -> StoreResult<Option<(usize, RawEntry)>> {
        let mut from = slot;
        for seg in self.segments.iter().skip(segment) {
            if let Some(entry) = seg.next_entry(from)? {
                return Ok(Some((seg.number(), entry)));
            }
            from = 0;
        }
        Ok(None)
    }

    /// Removes every entry, one segment at a time.
    pub fn clear(&self) -> StoreResult<usize> {
        self.segments
            .iter()
            .try_fold(0usize, |total, seg| Ok(total + seg.clear()?))
    }

    /// Flushes a file-backed region to disk. No-op for anonymous memory.
    pub fn flush(&self) -> StoreResult<()> {
        self.region.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SegmentedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedStore")
            .field("path", &self.region.path())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
