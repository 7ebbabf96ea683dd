//! Two-phase spin-then-yield backoff.

use std::hint::spin_loop;
use std::thread;

/// Bounded spinning followed by cooperative yielding.
///
/// The first [`Backoff::SPIN_LIMIT`] calls to [`snooze`](Backoff::snooze)
/// busy-wait with a CPU spin hint, which keeps latency low when the awaited
/// change is only a few instructions away. Later calls yield the thread to
/// the OS scheduler so a long wait does not burn a core.
#[derive(Debug, Clone)]
pub struct Backoff {
    step: u32,
    spin_limit: u32,
}

impl Backoff {
    /// Default number of spin iterations before switching to yielding.
    pub const SPIN_LIMIT: u32 = 128;

    /// Creates a backoff with the default spin limit.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_spin_limit(Self::SPIN_LIMIT)
    }

    /// Creates a backoff that spins `spin_limit` times before yielding.
    #[must_use]
    pub const fn with_spin_limit(spin_limit: u32) -> Self {
        Self {
            step: 0,
            spin_limit,
        }
    }

    /// Waits a little: spins while in the spin phase, yields afterwards.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step < self.spin_limit {
            spin_loop();
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }

    /// Returns `true` once the spin phase is exhausted.
    #[must_use]
    pub fn is_yielding(&self) -> bool {
        self.step >= self.spin_limit
    }

    /// Restarts the spin phase.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
