//! Map statistics.
//!
//! Counters are process-local: two processes mapping the same file each see
//! only their own operations.
//!
//! # Usage
//!
//! ```rust,ignore
//! let map: SharedMap<String, String> = SharedMap::open(Config::new())?;
//! map.put("key", "value")?;
//!
//! let stats = map.stats().snapshot();
//! println!("Writes: {}", stats.writes);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one open map.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
    acquires: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    scans: AtomicU64,
    capacity_failures: AtomicU64,
    errors: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self, bytes: usize) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquire(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed operation, classifying capacity exhaustion separately.
    pub(crate) fn record_error(&self, err: &crate::StoreError) {
        if err.is_capacity() {
            self.capacity_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of lookups that found an entry.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups that found nothing.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns the number of value writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of successful removals.
    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    /// Returns the number of get-or-create view acquisitions.
    pub fn acquires(&self) -> u64 {
        self.acquires.load(Ordering::Relaxed)
    }

    /// Returns the total value bytes written.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the total value bytes copied out.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the number of collection-view iterations started.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Returns how many operations failed with `CapacityExceeded`.
    pub fn capacity_failures(&self) -> u64 {
        self.capacity_failures.load(Ordering::Relaxed)
    }

    /// Returns the total number of failed operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            misses: self.misses(),
            writes: self.writes(),
            removes: self.removes(),
            acquires: self.acquires(),
            bytes_written: self.bytes_written(),
            bytes_read: self.bytes_read(),
            scans: self.scans(),
            capacity_failures: self.capacity_failures(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Lookups that found an entry.
    pub reads: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Value writes.
    pub writes: u64,
    /// Successful removals.
    pub removes: u64,
    /// Get-or-create view acquisitions.
    pub acquires: u64,
    /// Value bytes written.
    pub bytes_written: u64,
    /// Value bytes copied out.
    pub bytes_read: u64,
    /// Collection-view iterations started.
    pub scans: u64,
    /// Operations that failed with `CapacityExceeded`.
    pub capacity_failures: u64,
    /// All failed operations.
    pub errors: u64,
}
