//! Plain, timed and recursive mutexes.
//!
//! The plain mutex is one atomic flag; locking spins on a compare-exchange
//! with a yield between attempts, so unlocking is interrupt-safe. The
//! recursive flavor tracks an owning fiber id and a depth, guarded by a
//! process-wide critical section because id and depth must change together.
//! Unlocking a mutex that is not locked is a no-op, not undefined behavior.

use core::cell::Cell;
use core::time::Duration;

use portable_atomic::{AtomicBool, Ordering};

use crate::ops;
use crate::scheduler::Scheduler;
use crate::sync::Lockable;
use crate::time::{Clock, Instant};

/// Mutual exclusion for fibers, mirroring `std::mutex`.
pub struct Mutex {
    locked: AtomicBool,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Attempts to take the lock without yielding.
    ///
    /// Can be called from an interrupt.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Yields until the lock is taken.
    pub fn lock(&self) {
        while !self.try_lock() {
            ops::yield_now();
        }
    }

    /// Releases the lock. A no-op if the mutex is not locked.
    ///
    /// Can be called from an interrupt.
    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for Mutex {
    fn lock(&self) {
        Mutex::lock(self)
    }

    fn unlock(&self) {
        Mutex::unlock(self)
    }
}

/// [`Mutex`] with timed acquisition, mirroring `std::timed_mutex`.
pub struct TimedMutex {
    inner: Mutex,
}

impl TimedMutex {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(),
        }
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    pub fn lock(&self) {
        self.inner.lock()
    }

    #[inline]
    pub fn unlock(&self) {
        self.inner.unlock()
    }

    /// Yields until the lock is taken or `duration` elapsed; `true` on
    /// acquisition.
    pub fn try_lock_for(&self, duration: Duration) -> bool {
        ops::poll_for(duration, || self.try_lock())
    }

    /// Yields until the lock is taken or `deadline` passed; `true` on
    /// acquisition.
    pub fn try_lock_until<C: Clock>(&self, deadline: Instant<C>) -> bool {
        ops::poll_until(deadline, || self.try_lock())
    }
}

impl Default for TimedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for TimedMutex {
    fn lock(&self) {
        TimedMutex::lock(self)
    }

    fn unlock(&self) {
        TimedMutex::unlock(self)
    }
}

// Owner sentinel: real fiber ids are addresses (or 0 outside the
// scheduler), so all-ones can never collide.
const NO_OWNER: usize = usize::MAX;

/// Re-entrant mutual exclusion, mirroring `std::recursive_mutex`.
///
/// Works without a scheduler too: the fiber id is zero then, making this a
/// single-owner recursive lock.
pub struct RecursiveMutex {
    owner: Cell<usize>,
    depth: Cell<u16>,
}

// Owner and depth only change together inside a critical section.
unsafe impl Sync for RecursiveMutex {}

impl RecursiveMutex {
    pub const fn new() -> Self {
        Self {
            owner: Cell::new(NO_OWNER),
            depth: Cell::new(0),
        }
    }

    /// Greatest supported lock depth.
    pub const fn max_depth() -> u16 {
        u16::MAX
    }

    /// Attempts to take or re-enter the lock without yielding. Fails when
    /// another fiber owns the lock or the depth would overflow.
    pub fn try_lock(&self) -> bool {
        let me = Scheduler::current_id().as_raw();
        critical_section::with(|_| {
            let owner = self.owner.get();
            if owner == NO_OWNER {
                self.owner.set(me);
                self.depth.set(1);
                true
            } else if owner == me {
                let depth = self.depth.get();
                if depth == u16::MAX {
                    false
                } else {
                    self.depth.set(depth + 1);
                    true
                }
            } else {
                false
            }
        })
    }

    /// Yields until the lock is taken or re-entered.
    pub fn lock(&self) {
        while !self.try_lock() {
            ops::yield_now();
        }
    }

    /// Leaves one level of the lock, releasing ownership at the outermost
    /// level. A no-op when the caller does not own the lock.
    pub fn unlock(&self) {
        let me = Scheduler::current_id().as_raw();
        critical_section::with(|_| {
            if self.owner.get() == me {
                let depth = self.depth.get();
                if depth <= 1 {
                    self.owner.set(NO_OWNER);
                    self.depth.set(0);
                } else {
                    self.depth.set(depth - 1);
                }
            }
        });
    }
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for RecursiveMutex {
    fn lock(&self) {
        RecursiveMutex::lock(self)
    }

    fn unlock(&self) {
        RecursiveMutex::unlock(self)
    }
}

/// [`RecursiveMutex`] with timed acquisition, mirroring
/// `std::recursive_timed_mutex`.
pub struct RecursiveTimedMutex {
    inner: RecursiveMutex,
}

impl RecursiveTimedMutex {
    pub const fn new() -> Self {
        Self {
            inner: RecursiveMutex::new(),
        }
    }

    pub fn try_lock(&self) -> bool {
        self.inner.try_lock()
    }

    pub fn lock(&self) {
        self.inner.lock()
    }

    pub fn unlock(&self) {
        self.inner.unlock()
    }

    pub fn try_lock_for(&self, duration: Duration) -> bool {
        ops::poll_for(duration, || self.try_lock())
    }

    pub fn try_lock_until<C: Clock>(&self, deadline: Instant<C>) -> bool {
        ops::poll_until(deadline, || self.try_lock())
    }
}

impl Default for RecursiveTimedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for RecursiveTimedMutex {
    fn lock(&self) {
        RecursiveTimedMutex::lock(self)
    }

    fn unlock(&self) {
        RecursiveTimedMutex::unlock(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use crate::task::Task;
    use crate::testutil::Steps;
    use crate::yield_now;
    use core::pin::pin;

    #[test]
    fn try_lock_on_locked_mutex_fails_without_side_effects() {
        let mtx = Mutex::new();
        assert!(mtx.try_lock());
        assert!(!mtx.try_lock());
        assert!(!mtx.try_lock());
        mtx.unlock();
        // Unlocking an unlocked mutex stays a no-op.
        mtx.unlock();
        mtx.unlock();
        assert!(mtx.try_lock());
        mtx.unlock();
    }

    #[test]
    fn lock_without_scheduler_does_not_block() {
        let mtx = Mutex::new();
        mtx.lock();
        mtx.unlock();
    }

    #[test]
    fn contended_lock_hands_over_between_fibers() {
        let steps = Steps::new();
        let mtx = Mutex::new();
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut a = pin!(Task::new(&mut stack_a, || {
            steps.expect(0);
            assert!(mtx.try_lock());
            assert!(!mtx.try_lock());
            mtx.unlock();
            mtx.unlock();

            steps.expect(1);
            mtx.lock(); // free, must not yield
            steps.expect(2);
            mtx.lock(); // blocks until the other fiber unlocks

            mtx.unlock();
            mtx.unlock();
            steps.expect(5);
            mtx.lock(); // free again
            steps.expect(6);
            mtx.lock(); // blocks again

            steps.expect(8);
        }));
        let mut b = pin!(Task::new(&mut stack_b, || {
            steps.expect(3);
            yield_now();
            yield_now();
            yield_now();
            steps.expect(4);
            mtx.unlock();
            yield_now();

            steps.expect(7);
            mtx.unlock();
            yield_now();
            steps.expect(9);
        }));
        a.as_mut().start();
        b.as_mut().start();
        crate::Scheduler::run();
        steps.expect(10);
    }

    #[test]
    fn blocked_fiber_acquires_only_after_an_unlock() {
        let mtx = Mutex::new();
        let a_unlocked = core::cell::Cell::new(false);
        let b_acquired = core::cell::Cell::new(false);
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut a = pin!(Task::new(&mut stack_a, || {
            mtx.lock();
            yield_now();
            yield_now();
            yield_now();
            a_unlocked.set(true);
            mtx.unlock();
            mtx.lock();
            yield_now();
            mtx.unlock();
        }));
        let mut b = pin!(Task::new(&mut stack_b, || {
            mtx.lock();
            assert!(a_unlocked.get());
            b_acquired.set(true);
            yield_now();
            mtx.unlock();
        }));
        a.as_mut().start();
        b.as_mut().start();
        crate::Scheduler::run();
        assert!(b_acquired.get());
        assert!(mtx.try_lock());
        mtx.unlock();
    }

    #[test]
    fn timed_lock_times_out_under_contention() {
        use crate::time::MilliClock;

        MilliClock::set(0);
        let steps = Steps::new();
        let mtx = TimedMutex::new();
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut a = pin!(Task::new(&mut stack_a, || {
            steps.expect(0);
            mtx.lock();
            yield_now();
            steps.expect(2);
            MilliClock::advance(1);
            yield_now();
            steps.expect(3);
            MilliClock::advance(1);
            yield_now();
            steps.expect(5);
            mtx.unlock();
            yield_now();
        }));
        let mut b = pin!(Task::new(&mut stack_b, || {
            steps.expect(1);
            // Held by the other fiber while the clock runs out.
            assert!(!mtx.try_lock_for(Duration::from_millis(2)));
            steps.expect(4);
            // Released before the second timeout can expire.
            assert!(mtx.try_lock_for(Duration::from_millis(2)));
            steps.expect(6);
            mtx.unlock();
        }));
        a.as_mut().start();
        b.as_mut().start();
        crate::Scheduler::run();
        steps.expect(7);
    }

    #[test]
    fn recursive_lock_works_without_scheduler() {
        let mtx = RecursiveMutex::new();
        assert!(mtx.try_lock());
        assert!(mtx.try_lock());
        assert!(mtx.try_lock());
        mtx.unlock();
        mtx.unlock();
        mtx.unlock();
        // Extra unlocks are fine.
        mtx.unlock();
        mtx.unlock();

        mtx.lock();
        mtx.lock();
        mtx.unlock();
        mtx.unlock();
        assert!(mtx.try_lock());
        mtx.unlock();
    }

    #[test]
    fn recursive_ownership_excludes_other_fibers() {
        let steps = Steps::new();
        let mtx = RecursiveMutex::new();
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut a = pin!(Task::new(&mut stack_a, || {
            steps.expect(0);
            assert!(mtx.try_lock());
            assert!(mtx.try_lock());
            assert!(mtx.try_lock());
            yield_now();

            steps.expect(3);
            mtx.unlock();
            yield_now();
            steps.expect(4);
            mtx.unlock();
            yield_now();
            steps.expect(5);
            mtx.unlock();
            mtx.unlock(); // more than necessary
            yield_now();

            steps.expect(7);
            mtx.lock(); // blocks until the other fiber fully releases

            steps.expect(11);
            mtx.unlock();
            steps.expect(12);
        }));
        let mut b = pin!(Task::new(&mut stack_b, || {
            steps.expect(1);
            assert!(!mtx.try_lock());
            assert!(!mtx.try_lock());

            steps.expect(2);
            mtx.lock(); // blocks over three unlocks of the owner

            steps.expect(6);
            mtx.lock();
            mtx.lock();
            yield_now();

            steps.expect(8);
            mtx.unlock();
            yield_now();
            steps.expect(9);
            mtx.unlock();
            yield_now();
            steps.expect(10);
            mtx.unlock();
            yield_now();

            steps.expect(13);
        }));
        a.as_mut().start();
        b.as_mut().start();
        crate::Scheduler::run();
        steps.expect(14);

        assert!(mtx.try_lock());
        assert!(mtx.try_lock());
        mtx.unlock();
        mtx.unlock();
    }

    #[test]
    fn recursive_timed_lock_composes_polling() {
        let mtx = RecursiveTimedMutex::new();
        assert!(mtx.try_lock_for(Duration::from_millis(1)));
        assert!(mtx.try_lock());
        mtx.unlock();
        mtx.unlock();
    }
}
