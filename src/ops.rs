//! Free functions operating on the current fiber.
//!
//! These mirror the `std::thread` free-function surface: yielding, polling
//! a condition across yields, and time-bounded sleeps. All of them
//! degenerate gracefully when no scheduler is running: [`yield_now`]
//! returns immediately, so polling loops become plain busy-waits on the
//! calling thread.

use core::time::Duration;

use crate::scheduler::Scheduler;
use crate::task::FiberId;
use crate::time::{Clock, Instant, MicroClock, MilliClock};

/// Hands control to the next fiber in the run queue.
///
/// Returns immediately when no scheduler is active or only one fiber is
/// scheduled. Be careful to yield inside long-running loops: fibers are
/// cooperative and nothing preempts a fiber that does not yield.
#[inline]
pub fn yield_now() {
    unsafe { (*Scheduler::instance()).yield_once() }
}

/// Identifier of the current fiber, [`FiberId::none`] outside the
/// scheduler.
#[inline]
pub fn current_id() -> FiberId {
    Scheduler::current_id()
}

/// Yields until `condition` returns true.
///
/// The condition is evaluated before the first yield, so a condition that
/// is true on entry never yields.
pub fn poll<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    while !condition() {
        yield_now();
    }
}

/// Yields until `condition` returns true or `duration` has elapsed.
/// Returns `true` if the condition was met.
///
/// The millisecond clock is used when the duration is a whole number of
/// milliseconds, the microsecond clock otherwise; either way the duration
/// is rounded up to the next full tick. The condition is evaluated once
/// before the clock is sampled.
pub fn poll_for<F>(duration: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    if condition() {
        return true;
    }
    if duration.subsec_nanos() % 1_000_000 == 0 {
        poll_ticks::<MilliClock, F>(MilliClock::ticks_for(duration), condition)
    } else {
        poll_ticks::<MicroClock, F>(MicroClock::ticks_for(duration), condition)
    }
}

/// Yields until `condition` returns true or `deadline` is reached. Returns
/// `true` if the condition was met.
///
/// A deadline in the past resolves to a single condition check and one
/// yield.
pub fn poll_until<C, F>(deadline: Instant<C>, mut condition: F) -> bool
where
    C: Clock,
    F: FnMut() -> bool,
{
    if condition() {
        return true;
    }
    let start = C::now();
    // Signed remainder so deadlines in the past fail the loop immediately.
    let remaining = deadline.ticks_since(start) as i32;
    loop {
        yield_now();
        if condition() {
            return true;
        }
        if C::now().ticks_since(start) as i32 >= remaining {
            return false;
        }
    }
}

/// Yields for at least `duration`.
///
/// The actual delay can be longer depending on how busy the other fibers
/// are; there is no upper bound. For nanosecond-scale delays use a busy
/// wait outside the scheduler instead.
pub fn sleep_for(duration: Duration) {
    let _ = poll_for(duration, || false);
}

/// Yields until `deadline` is reached.
pub fn sleep_until<C: Clock>(deadline: Instant<C>) {
    let _ = poll_until(deadline, || false);
}

fn poll_ticks<C, F>(ticks: u32, mut condition: F) -> bool
where
    C: Clock,
    F: FnMut() -> bool,
{
    let start = C::now();
    loop {
        yield_now();
        if condition() {
            return true;
        }
        if C::now().ticks_since(start) >= ticks {
            return false;
        }
    }
}
