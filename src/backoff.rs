//! Spin-then-yield retry used by the blocking queue operations.

use crate::sync::{spin_loop, yield_now};

/// Busy spins before every further retry yields the processor.
pub(crate) const SPIN_LIMIT: usize = 64;

/// Retry state for one blocking call.
///
/// The first [`SPIN_LIMIT`] snoozes only issue a spin hint; after that each
/// snooze yields to the OS scheduler. There is no sleeping and no parking.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    spins: usize,
}

impl Backoff {
    pub(crate) const fn new() -> Self {
        Backoff { spins: 0 }
    }

    #[inline(always)]
    pub(crate) fn snooze(&mut self) {
        if self.spins < SPIN_LIMIT {
            self.spins += 1;
            spin_loop();
        } else {
            yield_now();
        }
    }

    #[cfg(test)]
    fn is_yielding(&self) -> bool {
        self.spins >= SPIN_LIMIT
    }
}
