//! Reusable barrier with a completion callback.

use core::cell::Cell;

use crate::ops;

/// Epoch token handed out by [`Barrier::arrive`]; equal to the barrier's
/// sequence number at arrival time.
pub type ArrivalToken = u16;

/// A cyclic rendezvous point for a fixed group of fibers, mirroring
/// `std::barrier`.
///
/// The last arrival of each epoch resets the counter, bumps the sequence
/// number and invokes the completion callback, in its own fiber.
///
/// Not interrupt-safe: the expected/count/sequence triple is updated as a
/// group, which only the single scheduling thread may do.
pub struct Barrier<F = fn()>
where
    F: Fn(),
{
    completion: F,
    expected: Cell<u16>,
    count: Cell<u16>,
    sequence: Cell<u16>,
}

fn no_completion() {}

impl Barrier<fn()> {
    /// Creates a barrier for `expected` arrivals per epoch, without a
    /// completion callback.
    pub const fn new(expected: u16) -> Self {
        Self::with_completion(expected, no_completion)
    }
}

impl<F: Fn()> Barrier<F> {
    /// Creates a barrier for `expected` arrivals per epoch; `completion`
    /// runs in the fiber of the last arrival of each epoch.
    pub const fn with_completion(expected: u16, completion: F) -> Self {
        Self {
            completion,
            expected: Cell::new(expected),
            count: Cell::new(expected),
            sequence: Cell::new(0),
        }
    }

    /// Greatest supported arrival count.
    pub const fn max() -> u16 {
        u16::MAX
    }

    /// Registers `n` arrivals and returns the current epoch token. The
    /// arrival that completes the epoch resets the barrier and invokes the
    /// completion callback.
    pub fn arrive(&self, n: u16) -> ArrivalToken {
        let token = self.sequence.get();
        let count = self.count.get();
        if n < count {
            self.count.set(count - n);
        } else {
            self.count.set(self.expected.get());
            self.sequence.set(token.wrapping_add(1));
            (self.completion)();
        }
        token
    }

    /// Yields until the epoch identified by `token` completed.
    pub fn wait(&self, token: ArrivalToken) {
        while token == self.sequence.get() {
            ops::yield_now();
        }
    }

    /// Arrives once and waits for the epoch to complete.
    pub fn arrive_and_wait(&self) {
        self.wait(self.arrive(1));
    }

    /// Removes this fiber from the group (decrementing the expected count,
    /// saturating at zero), then arrives once without waiting.
    pub fn arrive_and_drop(&self) {
        let expected = self.expected.get();
        if expected > 0 {
            self.expected.set(expected - 1);
        }
        let _ = self.arrive(1);
    }
}
