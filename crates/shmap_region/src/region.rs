//! Anonymous and file-backed memory mappings.

use crate::error::{RegionError, RegionResult};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, AtomicU64};

/// What the mapping is backed by.
#[derive(Debug)]
enum Backing {
    Anonymous,
    File {
        path: PathBuf,
        // Kept open for the lifetime of the mapping.
        _file: File,
    },
}

/// A fixed-size, writable memory mapping.
///
/// The mapping never moves or resizes after creation, so an offset obtained
/// once stays valid for the lifetime of the region.
///
/// # Concurrency
///
/// All accessors take `&self`. Byte copies ([`read`](Self::read),
/// [`write`](Self::write), [`fill`](Self::fill)) are plain memory operations:
/// callers must serialize overlapping copies with their own locking. The
/// atomic accessors ([`atomic_u32`](Self::atomic_u32),
/// [`atomic_u64`](Self::atomic_u64)) may be used concurrently from any number
/// of threads, and from other processes mapping the same file.
pub struct MappedRegion {
    base: NonNull<u8>,
    len: usize,
    // Owns the mapping that `base` points into; unmapped on drop.
    map: MmapMut,
    backing: Backing,
}

// SAFETY: `base` points into `map`, which is owned by the region and is never
// remapped. The region hands out memory only through bounds-checked copies and
// atomics; serializing non-atomic copies is the caller's documented contract.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Maps `len` bytes of zero-initialized anonymous memory.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is zero or the mapping fails.
    pub fn anonymous(len: usize) -> RegionResult<Self> {
        if len == 0 {
            return Err(RegionError::ZeroLength);
        }
        let map = MmapOptions::new().len(len).map_anon()?;
        Ok(Self::from_map(map, Backing::Anonymous))
    }

    /// Opens or creates the file at `path` and maps its first `len` bytes.
    ///
    /// A file shorter than `len` is extended with zeros (sparse where the
    /// file system supports it). Existing contents are preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, extended or mapped.
    pub fn open(path: &Path, len: usize) -> RegionResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::map_file(file, path, len)
    }

    /// Maps the first `len` bytes of an already opened file.
    ///
    /// The file must be opened for reading and writing. It is extended to
    /// `len` bytes if it is shorter.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is zero or extending/mapping the file fails.
    pub fn map_file(file: File, path: &Path, len: usize) -> RegionResult<Self> {
        if len == 0 {
            return Err(RegionError::ZeroLength);
        }
        if file.metadata()?.len() < len as u64 {
            file.set_len(len as u64)?;
        }

        // SAFETY: the file stays open for the lifetime of the mapping. Other
        // processes may modify the file concurrently; that is the purpose of a
        // shared mapping and all typed access goes through atomics or through
        // copies serialized by the caller.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        Ok(Self::from_map(
            map,
            Backing::File {
                path: path.to_path_buf(),
                _file: file,
            },
        ))
    }

    fn from_map(mut map: MmapMut, backing: Backing) -> Self {
        let len = map.len();
        let base = NonNull::new(map.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self {
            base,
            len,
            map,
            backing,
        }
    }

    /// Returns the size of the region in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the region has no bytes. Mapped regions never do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the backing file path, or `None` for anonymous memory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Anonymous => None,
            Backing::File { path, .. } => Some(path),
        }
    }

    /// Returns `true` if the region is backed by a file.
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        matches!(self.backing, Backing::File { .. })
    }

    /// Synchronously writes dirty pages back to the backing file.
    ///
    /// A no-op for anonymous regions.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS fails to sync the mapping.
    pub fn flush(&self) -> RegionResult<()> {
        if self.is_file_backed() {
            self.map.flush()?;
        }
        Ok(())
    }

    /// Writes the dirty pages of `[offset, offset + len)` back to the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or the sync fails.
    pub fn flush_range(&self, offset: usize, len: usize) -> RegionResult<()> {
        self.check(offset, len)?;
        if self.is_file_backed() && len > 0 {
            self.map.flush_range(offset, len)?;
        }
        Ok(())
    }

    /// Validates that `[offset, offset + len)` lies inside the region.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::OutOfBounds`] otherwise.
    pub fn check(&self, offset: usize, len: usize) -> RegionResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(RegionError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    fn ptr_at(&self, offset: usize) -> *mut u8 {
        // SAFETY: every caller has bounds checked `offset` first.
        unsafe { self.base.as_ptr().add(offset) }
    }

    /// Copies `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> RegionResult<()> {
        self.check(offset, buf.len())?;
        // SAFETY: the source range is in bounds and cannot overlap `buf`,
        // which is ordinary process memory.
        unsafe { ptr::copy_nonoverlapping(self.ptr_at(offset), buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    /// Copies `len` bytes starting at `offset` into a new vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds.
    pub fn read_vec(&self, offset: usize, len: usize) -> RegionResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(offset, &mut buf)?;
        Ok(buf)
    }

    /// Copies `data` into the region at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds.
    pub fn write(&self, offset: usize, data: &[u8]) -> RegionResult<()> {
        self.check(offset, data.len())?;
        // SAFETY: the destination range is in bounds and `data` cannot alias
        // the mapping through a safe reference handed out by this type.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), self.ptr_at(offset), data.len()) };
        Ok(())
    }

    /// Sets `len` bytes starting at `offset` to `byte`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds.
    pub fn fill(&self, offset: usize, len: usize, byte: u8) -> RegionResult<()> {
        self.check(offset, len)?;
        // SAFETY: the range is in bounds.
        unsafe { ptr::write_bytes(self.ptr_at(offset), byte, len) };
        Ok(())
    }

    /// Returns `true` if the bytes at `offset` equal `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds.
    pub fn bytes_equal(&self, offset: usize, expected: &[u8]) -> RegionResult<bool> {
        self.check(offset, expected.len())?;
        // SAFETY: the range is in bounds; the slice does not outlive this call.
        let actual = unsafe { std::slice::from_raw_parts(self.ptr_at(offset), expected.len()) };
        Ok(actual == expected)
    }

    fn check_aligned(&self, offset: usize, size: usize) -> RegionResult<()> {
        self.check(offset, size)?;
        if (self.base.as_ptr() as usize + offset) % size != 0 {
            return Err(RegionError::Misaligned {
                offset,
                align: size,
            });
        }
        Ok(())
    }

    /// Returns the 4-byte word at `offset` as an atomic.
    ///
    /// # Errors
    ///
    /// Returns an error if the word is out of bounds or not 4-byte aligned.
    pub fn atomic_u32(&self, offset: usize) -> RegionResult<&AtomicU32> {
        self.check_aligned(offset, 4)?;
        // SAFETY: in bounds, aligned, and the mapping outlives the returned
        // reference because the reference borrows `self`. All concurrent
        // accesses to the word go through atomics.
        Ok(unsafe { AtomicU32::from_ptr(self.ptr_at(offset).cast()) })
    }

    /// Returns the 8-byte word at `offset` as an atomic.
    ///
    /// # Errors
    ///
    /// Returns an error if the word is out of bounds or not 8-byte aligned.
    pub fn atomic_u64(&self, offset: usize) -> RegionResult<&AtomicU64> {
        self.check_aligned(offset, 8)?;
        // SAFETY: see `atomic_u32`.
        Ok(unsafe { AtomicU64::from_ptr(self.ptr_at(offset).cast()) })
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("len", &self.len)
            .field("backing", &self.backing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn anonymous_is_zeroed() {
        let region = MappedRegion::anonymous(4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert!(!region.is_file_backed());
        assert!(region.path().is_none());
        assert!(region.read_vec(0, 4096).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_length_rejected() {
        assert!(matches!(
            MappedRegion::anonymous(0),
            Err(RegionError::ZeroLength)
        ));
    }

    #[test]
    fn write_then_read() {
        let region = MappedRegion::anonymous(128).unwrap();
        region.write(10, b"abcdef").unwrap();
        assert_eq!(region.read_vec(10, 6).unwrap(), b"abcdef");
        assert!(region.bytes_equal(10, b"abc").unwrap());
        assert!(!region.bytes_equal(10, b"xyz").unwrap());
    }

    #[test]
    fn fill_overwrites_range() {
        let region = MappedRegion::anonymous(64).unwrap();
        region.write(0, &[7u8; 64]).unwrap();
        region.fill(8, 16, 0).unwrap();
        let data = region.read_vec(0, 64).unwrap();
        assert!(data[..8].iter().all(|&b| b == 7));
        assert!(data[8..24].iter().all(|&b| b == 0));
        assert!(data[24..].iter().all(|&b| b == 7));
    }

    #[test]
    fn out_of_bounds_rejected() {
        let region = MappedRegion::anonymous(64).unwrap();
        assert!(matches!(
            region.write(60, b"12345"),
            Err(RegionError::OutOfBounds { .. })
        ));
        assert!(matches!(
            region.read_vec(usize::MAX, 2),
            Err(RegionError::OutOfBounds { .. })
        ));
        assert!(region.atomic_u64(64).is_err());
    }

    #[test]
    fn misaligned_atomic_rejected() {
        let region = MappedRegion::anonymous(64).unwrap();
        assert!(matches!(
            region.atomic_u32(2),
            Err(RegionError::Misaligned { align: 4, .. })
        ));
        assert!(matches!(
            region.atomic_u64(4),
            Err(RegionError::Misaligned { align: 8, .. })
        ));
        assert!(region.atomic_u64(8).is_ok());
    }

    #[test]
    fn atomics_from_many_threads() {
        let region = Arc::new(MappedRegion::anonymous(4096).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let region = Arc::clone(&region);
                thread::spawn(move || {
                    let counter = region.atomic_u64(128).unwrap();
                    for _ in 0..10_000 {
                        counter.fetch_add(1, Ordering::AcqRel);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(region.atomic_u64(128).unwrap().load(Ordering::Acquire), 40_000);
    }

    #[test]
    fn file_contents_survive_remap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.bin");

        {
            let region = MappedRegion::open(&path, 8192).unwrap();
            assert!(region.is_file_backed());
            assert_eq!(region.path(), Some(path.as_path()));
            region.write(100, b"persistent").unwrap();
            region.atomic_u32(4096).unwrap().store(42, Ordering::Release);
            region.flush().unwrap();
        }

        let region = MappedRegion::open(&path, 8192).unwrap();
        assert_eq!(region.read_vec(100, 10).unwrap(), b"persistent");
        assert_eq!(region.atomic_u32(4096).unwrap().load(Ordering::Acquire), 42);
    }

    #[test]
    fn two_mappings_share_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.bin");

        let a = MappedRegion::open(&path, 4096).unwrap();
        let b = MappedRegion::open(&path, 4096).unwrap();

        a.atomic_u64(0).unwrap().fetch_add(5, Ordering::AcqRel);
        b.atomic_u64(0).unwrap().fetch_add(7, Ordering::AcqRel);
        assert_eq!(a.atomic_u64(0).unwrap().load(Ordering::Acquire), 12);

        a.write(64, b"from a").unwrap();
        assert_eq!(b.read_vec(64, 6).unwrap(), b"from a");
    }

    #[test]
    fn file_is_extended_to_requested_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grow.bin");
        std::fs::write(&path, b"abc").unwrap();

        let region = MappedRegion::open(&path, 1 << 20).unwrap();
        assert_eq!(region.len(), 1 << 20);
        assert_eq!(region.read_vec(0, 3).unwrap(), b"abc");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1 << 20);
        region.flush_range(0, 4096).unwrap();
    }

    proptest! {
        #[test]
        fn prop_write_read(offset in 0usize..4000, data in proptest::collection::vec(any::<u8>(), 0..96)) {
            let region = MappedRegion::anonymous(4096).unwrap();
            region.write(offset, &data).unwrap();
            prop_assert_eq!(region.read_vec(offset, data.len()).unwrap(), data);
        }
    }
}
