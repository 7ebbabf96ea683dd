//! Segment lock living inside the mapped region.
//!
//! A process-local mutex cannot guard memory shared with other processes, so
//! each segment header carries a test-and-test-and-set lock word. The word
//! holds `0` when free and the owner's process id while held.

use crate::backoff::Backoff;
use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;

fn owner_token() -> u32 {
    std::process::id().max(1)
}

/// Acquires the lock word, spinning then yielding while it is held.
pub(crate) fn lock(word: &AtomicU32) -> SegmentGuard<'_> {
    let token = owner_token();
    let mut backoff = Backoff::new();
    loop {
        // Test phase: wait on a plain load so the line stays shared.
        while word.load(Ordering::Relaxed) != UNLOCKED {
            backoff.snooze();
        }
        if word
            .compare_exchange_weak(UNLOCKED, token, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return SegmentGuard { word };
        }
    }
}

/// Proof that a segment's lock is held. Releases the lock on drop.
///
/// Structural helpers (allocator, index) take `&SegmentGuard` so they can only
/// be called from inside a critical section.
#[must_use = "the segment is unlocked as soon as the guard is dropped"]
pub(crate) struct SegmentGuard<'a> {
    word: &'a AtomicU32,
}

impl Drop for SegmentGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.word.store(UNLOCKED, Ordering::Release);
    }
}
