//! Synchronization primitives built on cooperative yields.
//!
//! Every primitive here busy-waits by yielding on an atomic of its own;
//! none of them ever touches the scheduler's run queue from the fast path.
//! That keeps the documented subset of operations safe to call from
//! interrupt handlers: waiting fibers observe progress from their own
//! yield loops. The exceptions are [`Barrier`] (multi-field state) and
//! [`Channel`] (run-queue handoff), which are scheduler-thread only.
//!
//! Without a running scheduler all primitives degrade to spinning on the
//! calling thread; the uncontended paths still work, which is what allows
//! them to be used from `main` before `Scheduler::run()`.

mod barrier;
mod channel;
mod condvar;
mod latch;
mod mutex;
mod once;
mod semaphore;
mod shared_mutex;

pub use barrier::{ArrivalToken, Barrier};
pub use channel::Channel;
pub use condvar::{Condvar, CvStatus};
pub use latch::Latch;
pub use mutex::{Mutex, RecursiveMutex, RecursiveTimedMutex, TimedMutex};
pub use once::{call_once, OnceFlag};
pub use semaphore::{BinarySemaphore, CountingSemaphore};
pub use shared_mutex::{SharedMutex, SharedTimedMutex};

/// An exclusive lock usable by [`Condvar`]: the C++ *BasicLockable*
/// requirements expressed as a trait.
///
/// Implementations must be callable through a shared reference; the fiber
/// mutexes qualify, as does any instrumented lock a test wants to slide in.
pub trait Lockable {
    /// Blocks (by yielding) until the lock is held.
    fn lock(&self);
    /// Releases the lock.
    fn unlock(&self);
}
