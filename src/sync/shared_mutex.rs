//! Reader-writer locks over a single owner word.
//!
//! The whole lock is one atomic fiber id with two sentinels: no owner and
//! "owned shared". The encoding cannot count shared holders, so the first
//! shared unlock releases the lock for everyone; that degraded fairness is
//! accepted in exchange for a single-word, interrupt-safe implementation.

use core::time::Duration;

use portable_atomic::{AtomicUsize, Ordering};

use crate::ops;
use crate::scheduler::Scheduler;
use crate::sync::Lockable;
use crate::time::{Clock, Instant};

const NO_OWNER: usize = usize::MAX;
const SHARED_OWNER: usize = usize::MAX - 1;

/// Shared/exclusive lock for fibers, mirroring `std::shared_mutex`.
pub struct SharedMutex {
    owner: AtomicUsize,
}

impl SharedMutex {
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(NO_OWNER),
        }
    }

    /// Attempts to take the exclusive lock without yielding.
    ///
    /// Can be called from an interrupt.
    pub fn try_lock(&self) -> bool {
        let me = Scheduler::current_id().as_raw();
        self.owner
            .compare_exchange(NO_OWNER, me, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Yields until the exclusive lock is taken.
    pub fn lock(&self) {
        while !self.try_lock() {
            ops::yield_now();
        }
    }

    /// Releases the exclusive lock.
    ///
    /// Can be called from an interrupt.
    pub fn unlock(&self) {
        self.owner.store(NO_OWNER, Ordering::Release);
    }

    /// Attempts to take the shared lock without yielding. Succeeds while
    /// the lock is free or already shared.
    ///
    /// Can be called from an interrupt.
    pub fn try_lock_shared(&self) -> bool {
        let mut current = self.owner.load(Ordering::Relaxed);
        loop {
            // Anything below the sentinels is a real exclusive owner.
            if current < SHARED_OWNER {
                return false;
            }
            match self.owner.compare_exchange_weak(
                current,
                SHARED_OWNER,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(owner) => current = owner,
            }
        }
    }

    /// Yields until a shared lock is taken.
    pub fn lock_shared(&self) {
        while !self.try_lock_shared() {
            ops::yield_now();
        }
    }

    /// Releases the shared lock. Note that this frees the lock for all
    /// holders, see the module documentation.
    ///
    /// Can be called from an interrupt.
    pub fn unlock_shared(&self) {
        self.owner.store(NO_OWNER, Ordering::Release);
    }
}

impl Default for SharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for SharedMutex {
    fn lock(&self) {
        SharedMutex::lock(self)
    }

    fn unlock(&self) {
        SharedMutex::unlock(self)
    }
}

/// [`SharedMutex`] with timed acquisition, mirroring
/// `std::shared_timed_mutex`.
pub struct SharedTimedMutex {
    inner: SharedMutex,
}

impl SharedTimedMutex {
    pub const fn new() -> Self {
        Self {
            inner: SharedMutex::new(),
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

    pub fn try_lock_shared(&self) -> bool {
        self.inner.try_lock_shared()
    }

    pub fn lock_shared(&self) {
        self.inner.lock_shared()
    }

    pub fn unlock_shared(&self) {
        self.inner.unlock_shared()
    }

    pub fn try_lock_for(&self, duration: Duration) -> bool {
        ops::poll_for(duration, || self.try_lock())
    }

    pub fn try_lock_until<C: Clock>(&self, deadline: Instant<C>) -> bool {
        ops::poll_until(deadline, || self.try_lock())
    }

    pub fn try_lock_shared_for(&self, duration: Duration) -> bool {
        ops::poll_for(duration, || self.try_lock_shared())
    }

    pub fn try_lock_shared_until<C: Clock>(&self, deadline: Instant<C>) -> bool {
        ops::poll_until(deadline, || self.try_lock_shared())
    }
}

impl Default for SharedTimedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for SharedTimedMutex {
    fn lock(&self) {
        SharedTimedMutex::lock(self)
    }

    fn unlock(&self) {
        SharedTimedMutex::unlock(self)
    }
}
