//! Cyclic id generation for pooled entities.
//!
//! Generators are created per pool rather than shared process-wide, so pools
//! built in parallel never contend or collide on ids.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// A thread-safe generator of monotonically increasing 32-bit ids.
///
/// The sequence starts at 0 and wraps back to 0 past `u32::MAX`. Collisions
/// across the wrap boundary are acceptable for pools whose lifetime never
/// accommodates that many entities.
#[derive(Debug, Default)]
pub struct IdGenerator {
    sn: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn starting_at(sn: u32) -> Self {
        IdGenerator {
            sn: AtomicU32::new(sn),
        }
    }

    pub fn next(&self) -> u32 {
        self.sn.fetch_add(1, Ordering::Relaxed)
    }
}

/// A 64-bit generator composed from a 32-bit generator and a cycle counter.
///
/// Each full cycle of the low half bumps the high half, so the sequence
/// spans the 64-bit range. The two halves are read without a common lock;
/// ids near a cycle boundary may repeat, which the pool machinery tolerates.
#[derive(Debug, Default)]
pub struct WideIdGenerator {
    base: IdGenerator,
    cycles: AtomicU64,
}

impl WideIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let low = self.base.next();
        if low == u32::MAX {
            self.cycles.fetch_add(1, Ordering::Relaxed);
        }
        let high = self.cycles.load(Ordering::Relaxed);
        (high << 32) | u64::from(low)
    }
}
