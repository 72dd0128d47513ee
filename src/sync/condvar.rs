//! Condition variable over a bare sequence counter.
//!
//! Notifications increment a 16-bit sequence number; waiters snapshot it
//! before unlocking the external lock and poll for any change. A notifier
//! racing between the snapshot and the unlock is therefore still observed
//! on the next poll, so no wakeup can be lost across the lock boundary.
//! Notifying is interrupt-safe.

use core::time::Duration;

use portable_atomic::{AtomicU16, Ordering};

use crate::ops;
use crate::stop::StopToken;
use crate::sync::Lockable;
use crate::time::{Clock, Instant};

/// Result of a timed wait.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CvStatus {
    NoTimeout,
    Timeout,
}

/// A condition variable working with any [`Lockable`], mirroring
/// `std::condition_variable_any`.
///
/// Under cooperative scheduling `notify_one` and `notify_all` are the same
/// operation: every waiter observes the sequence change at its next poll.
pub struct Condvar {
    sequence: AtomicU16,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            sequence: AtomicU16::new(0),
        }
    }

    /// Wakes one waiter.
    ///
    /// Can be called from an interrupt.
    pub fn notify_one(&self) {
        self.sequence.fetch_add(1, Ordering::Release);
    }

    /// Wakes all waiters.
    ///
    /// Can be called from an interrupt.
    pub fn notify_all(&self) {
        self.notify_one();
    }

    /// Unlocks `lock`, waits for a notification, then relocks.
    ///
    /// Unlocks exactly once on entry and relocks exactly once on exit.
    pub fn wait<L: Lockable>(&self, lock: &L) {
        let seq = self.sequence.load(Ordering::Acquire);
        lock.unlock();
        ops::poll(|| self.sequence.load(Ordering::Acquire) != seq);
        lock.lock();
    }

    /// Waits until `predicate` returns true, rechecking after every
    /// notification.
    pub fn wait_with<L, P>(&self, lock: &L, mut predicate: P)
    where
        L: Lockable,
        P: FnMut() -> bool,
    {
        while !predicate() {
            self.wait(lock);
        }
    }

    /// Waits until `predicate` returns true or a stop is requested on
    /// `token`. Returns the final predicate evaluation.
    pub fn wait_with_token<L, P>(&self, lock: &L, token: StopToken<'_>, mut predicate: P) -> bool
    where
        L: Lockable,
        P: FnMut() -> bool,
    {
        while !token.stop_requested() {
            if predicate() {
                return true;
            }
            self.wait(lock);
        }
        predicate()
    }

    /// Waits for a notification or for `rel_time` to elapse.
    pub fn wait_for<L: Lockable>(&self, lock: &L, rel_time: Duration) -> CvStatus {
        let seq = self.sequence.load(Ordering::Acquire);
        lock.unlock();
        let notified = ops::poll_for(rel_time, || self.sequence.load(Ordering::Acquire) != seq);
        lock.lock();
        if notified {
            CvStatus::NoTimeout
        } else {
            CvStatus::Timeout
        }
    }

    /// Waits until `predicate` returns true, giving up `rel_time` after
    /// the last notification. Returns the final predicate evaluation.
    pub fn wait_for_with<L, P>(&self, lock: &L, rel_time: Duration, mut predicate: P) -> bool
    where
        L: Lockable,
        P: FnMut() -> bool,
    {
        while !predicate() {
            if self.wait_for(lock, rel_time) == CvStatus::Timeout {
                return predicate();
            }
        }
        true
    }

    /// Timed, predicated wait that additionally stops when a stop is
    /// requested on `token`. Returns the final predicate evaluation.
    pub fn wait_for_with_token<L, P>(
        &self,
        lock: &L,
        token: StopToken<'_>,
        rel_time: Duration,
        mut predicate: P,
    ) -> bool
    where
        L: Lockable,
        P: FnMut() -> bool,
    {
        while !token.stop_requested() {
            if predicate() {
                return true;
            }
            if self.wait_for(lock, rel_time) == CvStatus::Timeout {
                return predicate();
            }
        }
        predicate()
    }

    /// Waits for a notification or for `deadline` to pass.
    pub fn wait_until<L, C>(&self, lock: &L, deadline: Instant<C>) -> CvStatus
    where
        L: Lockable,
        C: Clock,
    {
        let seq = self.sequence.load(Ordering::Acquire);
        lock.unlock();
        let notified = ops::poll_until(deadline, || self.sequence.load(Ordering::Acquire) != seq);
        lock.lock();
        if notified {
            CvStatus::NoTimeout
        } else {
            CvStatus::Timeout
        }
    }

    /// Waits until `predicate` returns true or `deadline` passes. Returns
    /// the final predicate evaluation.
    pub fn wait_until_with<L, C, P>(&self, lock: &L, deadline: Instant<C>, mut predicate: P) -> bool
    where
        L: Lockable,
        C: Clock,
        P: FnMut() -> bool,
    {
        while !predicate() {
            if self.wait_until(lock, deadline) == CvStatus::Timeout {
                return predicate();
            }
        }
        true
    }

    /// Deadline-bounded, predicated wait that additionally stops when a
    /// stop is requested on `token`. Returns the final predicate
    /// evaluation.
    pub fn wait_until_with_token<L, C, P>(
        &self,
        lock: &L,
        token: StopToken<'_>,
        deadline: Instant<C>,
        mut predicate: P,
    ) -> bool
    where
        L: Lockable,
        C: Clock,
        P: FnMut() -> bool,
    {
        while !token.stop_requested() {
            if predicate() {
                return true;
            }
            if self.wait_until(lock, deadline) == CvStatus::Timeout {
                return predicate();
            }
        }
        predicate()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
