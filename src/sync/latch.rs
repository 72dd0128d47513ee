//! Single-use countdown latch.

use portable_atomic::{AtomicU16, Ordering};

use crate::ops;

/// A downward counter fibers can wait on, mirroring `std::latch`.
///
/// The counter saturates at zero and can never be reset; counting down is
/// interrupt-safe.
pub struct Latch {
    count: AtomicU16,
}

impl Latch {
    /// Creates a latch that opens after `expected` count-downs.
    pub const fn new(expected: u16) -> Self {
        Self {
            count: AtomicU16::new(expected),
        }
    }

    /// Greatest supported initial count.
    pub const fn max() -> u16 {
        u16::MAX
    }

    /// Decrements the counter by `n`, saturating at zero.
    ///
    /// Can be called from an interrupt.
    pub fn count_down(&self, n: u16) {
        let mut value = self.count.load(Ordering::Relaxed);
        loop {
            if value == 0 {
                return;
            }
            let next = value.saturating_sub(n);
            match self
                .count
                .compare_exchange_weak(value, next, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => value = observed,
            }
        }
    }

    /// Whether the counter reached zero.
    ///
    /// Can be called from an interrupt.
    pub fn try_wait(&self) -> bool {
        self.count.load(Ordering::Relaxed) == 0
    }

    /// Yields until the counter reaches zero.
    pub fn wait(&self) {
        ops::poll(|| self.try_wait());
    }

    /// Counts down by `n`, then waits for the latch to open.
    pub fn arrive_and_wait(&self, n: u16) {
        self.count_down(n);
        self.wait();
    }
}
