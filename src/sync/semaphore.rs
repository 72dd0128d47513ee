//! Counting semaphores over a single atomic counter.

use core::time::Duration;

use portable_atomic::{AtomicU16, Ordering};

use crate::ops;
use crate::time::{Clock, Instant};

/// A lightweight counting semaphore, mirroring `std::counting_semaphore`.
///
/// `LEAST_MAX_VALUE` bounds the counter the same way the C++ template
/// parameter does; the backing atomic is 16 bits wide, which covers every
/// sensible fiber count on the supported targets.
pub struct CountingSemaphore<const LEAST_MAX_VALUE: u16 = 65535> {
    counter: AtomicU16,
}

impl<const LEAST_MAX_VALUE: u16> CountingSemaphore<LEAST_MAX_VALUE> {
    /// Creates a semaphore with `desired` permits available.
    pub const fn new(desired: u16) -> Self {
        assert!(desired <= LEAST_MAX_VALUE);
        Self {
            counter: AtomicU16::new(desired),
        }
    }

    /// Greatest number of permits this semaphore can hold.
    pub const fn max() -> u16 {
        LEAST_MAX_VALUE
    }

    /// Attempts to take a permit without yielding.
    ///
    /// Can be called from an interrupt.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.counter.load(Ordering::Relaxed);
        loop {
            if count == 0 {
                return false;
            }
            match self.counter.compare_exchange_weak(
                count,
                count - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => count = observed,
            }
        }
    }

    /// Yields until a permit was taken.
    pub fn acquire(&self) {
        while !self.try_acquire() {
            ops::yield_now();
        }
    }

    /// Returns one permit.
    ///
    /// Can be called from an interrupt.
    pub fn release(&self) {
        self.counter.fetch_add(1, Ordering::Release);
    }

    /// Yields until a permit was taken or `duration` elapsed; `true` on
    /// acquisition.
    pub fn try_acquire_for(&self, duration: Duration) -> bool {
        ops::poll_for(duration, || self.try_acquire())
    }

    /// Yields until a permit was taken or `deadline` passed; `true` on
    /// acquisition.
    pub fn try_acquire_until<C: Clock>(&self, deadline: Instant<C>) -> bool {
        ops::poll_until(deadline, || self.try_acquire())
    }
}

/// A semaphore with a single permit, mirroring `std::binary_semaphore`.
pub type BinarySemaphore = CountingSemaphore<1>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use crate::task::Task;
    use crate::testutil::Steps;
    use crate::yield_now;
    use core::pin::pin;

    #[test]
    fn acquire_release_roundtrip_without_scheduler() {
        let sem: CountingSemaphore<3> = CountingSemaphore::new(3);
        assert_eq!(CountingSemaphore::<3>::max(), 3);
        assert!(sem.try_acquire());
        assert!(sem.try_acquire());
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release();
        sem.acquire();
        sem.release();
        sem.release();
        sem.release();
    }

    #[test]
    fn binary_semaphore_is_a_one_permit_semaphore() {
        let sem = BinarySemaphore::new(1);
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release();
        assert!(sem.try_acquire());
        sem.release();
    }

    #[test]
    fn acquirers_wake_on_release() {
        let steps = Steps::new();
        let sem: CountingSemaphore<3> = CountingSemaphore::new(3);
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut a = pin!(Task::new(&mut stack_a, || {
            steps.expect(0);
            assert!(sem.try_acquire()); // 2 left
            assert!(sem.try_acquire()); // 1
            assert!(sem.try_acquire()); // 0
            assert!(!sem.try_acquire());
            sem.release(); // 1
            sem.acquire(); // 0
            steps.expect(1);
            sem.acquire(); // blocks until the other fiber releases

            steps.expect(4);
            sem.release();
            sem.release(); // 2
            yield_now();

            steps.expect(6);
            sem.acquire(); // 0 again after the other fiber took one
            sem.acquire(); // blocks

            steps.expect(9);
        }));
        let mut b = pin!(Task::new(&mut stack_b, || {
            steps.expect(2);
            yield_now();

            steps.expect(3);
            sem.release(); // 1, wakes the acquirer
            yield_now();

            steps.expect(5);
            sem.acquire(); // 1 left
            yield_now();

            steps.expect(7);
            sem.release();
            sem.release();
            sem.release(); // 3

            steps.expect(8);
        }));
        a.as_mut().start();
        b.as_mut().start();
        crate::Scheduler::run();
        steps.expect(10);
    }

    #[test]
    fn timed_acquire_times_out_when_drained() {
        use crate::time::MilliClock;

        MilliClock::set(0);
        let steps = Steps::new();
        let sem = BinarySemaphore::new(1);
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut a = pin!(Task::new(&mut stack_a, || {
            steps.expect(0);
            assert!(sem.try_acquire());
            yield_now();
            steps.expect(2);
            MilliClock::advance(1);
            yield_now();
            steps.expect(3);
            MilliClock::advance(1);
            yield_now();
            steps.expect(5);
            sem.release();
            yield_now();
        }));
        let mut b = pin!(Task::new(&mut stack_b, || {
            steps.expect(1);
            // Drained while the clock runs out.
            assert!(!sem.try_acquire_for(Duration::from_millis(2)));
            steps.expect(4);
            // Released before the second timeout can expire.
            assert!(sem.try_acquire_for(Duration::from_millis(2)));
            steps.expect(6);
            sem.release();
        }));
        a.as_mut().start();
        b.as_mut().start();
        crate::Scheduler::run();
        steps.expect(7);
    }
}
