#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Cooperative stackful fiber runtime for bare-metal and hosted targets.
//!
//! A [`Task`] binds a closure to a caller-provided [`Stack`] and a slot in
//! the thread-local [`Scheduler`]'s circular run queue. Fibers interleave
//! only at explicit yield points; there is no preemption, no priorities
//! and no heap allocation anywhere in the runtime. On top of that yield
//! discipline sits a family of `std::thread`-shaped synchronization
//! primitives whose signal halves (semaphore release, latch count-down,
//! stop requests, condition-variable notification) are safe to call from
//! interrupt handlers.
//!
//! # Quick start
//!
//! ```
//! use core::pin::pin;
//! use cofiber::{Scheduler, Stack, Task};
//!
//! let mut stack = Stack::<256>::new();
//! let mut task = pin!(Task::new(&mut stack, || {
//!     cofiber::yield_now();
//! }));
//! task.as_mut().start();
//! Scheduler::run();
//! ```
//!
//! # Target support
//!
//! `x86_64` (hosted, used by the test suite) and `aarch64` (bare metal).
//! Platform glue provides the two clock drives ([`MilliClock`],
//! [`MicroClock`]) and the interrupt nesting marks
//! ([`arch::irq_enter`]/[`arch::irq_exit`]).
//!
//! # Features
//!
//! - `std-shim`: run the fiber runtime on hosted OS threads; the active
//!   scheduler and the clock storage become thread-locals so every thread
//!   carries its own independent fiber world.
//! - `defmt`: trace-level scheduler diagnostics through `defmt`.

#[cfg(any(test, feature = "std-shim"))]
extern crate std;

mod fmt;

pub mod arch;
pub mod context;
pub mod ops;
pub mod scheduler;
pub mod stack;
pub mod stop;
pub mod sync;
pub mod task;
pub mod time;

#[cfg(test)]
mod testutil;

pub use context::Context;
pub use ops::{current_id, poll, poll_for, poll_until, sleep_for, sleep_until, yield_now};
pub use scheduler::Scheduler;
pub use stack::Stack;
pub use stop::{StopSource, StopState, StopToken};
pub use sync::{
    call_once, ArrivalToken, Barrier, BinarySemaphore, Channel, Condvar, CountingSemaphore,
    CvStatus, Latch, Lockable, Mutex, OnceFlag, RecursiveMutex, RecursiveTimedMutex, SharedMutex,
    SharedTimedMutex, TimedMutex,
};
pub use task::{FiberId, Task};
pub use time::{Clock, Instant, MicroClock, MilliClock};
