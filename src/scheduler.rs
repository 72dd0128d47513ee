//! Cooperative round-robin scheduler over a circular intrusive run queue.
//!
//! One scheduler exists per execution context: a thread-local on hosted
//! builds, a single static on bare metal. Tasks link themselves into a
//! singly-linked circular list through their own `next` pointers, so
//! enqueue, dequeue and rotation are all O(1) and allocation-free.
//!
//! List invariant: while a fiber executes, `last` is its predecessor in the
//! cycle, i.e. `last.next == current`. `add` splices behind `last` (tail
//! enqueue), `run_next` splices behind `current` (the next `yield` lands in
//! the spliced task), and `remove_current` unlinks through `last`. Each
//! operation preserves the invariant.
//!
//! The run queue is private to the scheduling thread. Interrupt-signalable
//! primitives never touch it; they only flip their own atomics and let the
//! waiting fibers observe the change from their yield loops.

use core::cell::Cell;
use core::ptr;

use crate::arch;
use crate::fmt::trace;
use crate::task::{FiberId, Task};

/// Type-erased pointer to a task control block in the run queue.
///
/// The lifetime is erased at the queue boundary; safety rests on the `Task`
/// contract that a scheduled task is pinned and joins before its storage
/// dies.
pub(crate) type TaskPtr = *mut Task<'static>;

/// The cooperative scheduler of the current execution context.
///
/// All fibers of one context share this scheduler and interleave only at
/// explicit yield points. There is no preemption, no priorities and no work
/// stealing; fairness is strict FIFO rotation.
pub struct Scheduler {
    /// Tail of the circular run queue; null when the queue is empty.
    last: Cell<TaskPtr>,
    /// The fiber whose stack is active inside `run()`; null outside.
    current: Cell<TaskPtr>,
    /// Saved stack pointer of the thread that called `run()`.
    main_sp: Cell<*mut usize>,
}

// One scheduler per core; the bare-metal build has exactly one core and the
// run queue is never touched from interrupts.
unsafe impl Sync for Scheduler {}

#[cfg(any(test, feature = "std-shim"))]
mod active {
    use super::Scheduler;

    std::thread_local! {
        static INSTANCE: Scheduler = const { Scheduler::new() };
    }

    pub(super) fn instance() -> *const Scheduler {
        INSTANCE.with(|sched| sched as *const Scheduler)
    }
}

#[cfg(not(any(test, feature = "std-shim")))]
mod active {
    use super::Scheduler;

    static INSTANCE: Scheduler = Scheduler::new();

    pub(super) fn instance() -> *const Scheduler {
        &INSTANCE
    }
}

impl Scheduler {
    const fn new() -> Self {
        Self {
            last: Cell::new(ptr::null_mut()),
            current: Cell::new(ptr::null_mut()),
            main_sp: Cell::new(ptr::null_mut()),
        }
    }

    /// The scheduler of the current execution context.
    ///
    /// The instance always exists; whether it is *running* is a separate
    /// question answered by a null `current`.
    pub(crate) fn instance() -> *const Scheduler {
        active::instance()
    }

    /// Runs the scheduler until the run queue is empty.
    ///
    /// Picks the head of the queue and jumps into it; control returns here
    /// once the last task has finished or parked itself elsewhere. Returns
    /// immediately if no tasks are scheduled or the scheduler is already
    /// running.
    pub fn run() {
        let sched = unsafe { &*Self::instance() };
        if !sched.current.get().is_null() {
            return;
        }
        let last = sched.last.get();
        if last.is_null() {
            return;
        }
        trace!("scheduler: run");
        unsafe {
            let head = (*last).next.get();
            sched.current.set(head);
            arch::switch(sched.main_sp.as_ptr(), (*head).ctx.sp_slot());
        }
        trace!("scheduler: idle");
    }

    /// Identifier of the currently executing fiber, [`FiberId::none`] when
    /// called outside of [`run`](Scheduler::run).
    ///
    /// Can be called from an interrupt.
    pub fn current_id() -> FiberId {
        let sched = unsafe { &*Self::instance() };
        FiberId::from_raw(sched.current.get() as usize)
    }

    /// Whether execution is currently inside an interrupt handler, as
    /// reported by the platform glue ([`arch::irq_enter`]).
    pub fn is_inside_interrupt() -> bool {
        arch::in_interrupt()
    }

    /// Number of concurrent execution contexts backing this scheduler.
    pub fn hardware_concurrency() -> usize {
        #[cfg(any(test, feature = "std-shim"))]
        {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
        #[cfg(not(any(test, feature = "std-shim")))]
        {
            1
        }
    }

    pub(crate) fn current_task(&self) -> TaskPtr {
        self.current.get()
    }

    /// Rotates to the next fiber in the queue. A no-op outside `run()` or
    /// with fewer than two tasks scheduled.
    pub(crate) fn yield_once(&self) {
        let cur = self.current.get();
        if cur.is_null() {
            return;
        }
        let next = unsafe { (*cur).next.get() };
        if next == cur {
            return;
        }
        self.last.set(cur);
        self.current.set(next);
        unsafe { arch::switch((*cur).ctx.sp_slot(), (*next).ctx.sp_slot()) };
    }

    /// Enqueues a detached task at the tail of the run queue.
    ///
    /// # Safety
    ///
    /// `task` must be detached, pinned, and outlive its time in the queue.
    pub(crate) unsafe fn add(&self, task: TaskPtr) {
        unsafe {
            (*task).scheduler.set(self as *const Scheduler);
            let last = self.last.get();
            if last.is_null() {
                (*task).next.set(task);
            } else {
                (*task).next.set((*last).next.get());
                (*last).next.set(task);
            }
            self.last.set(task);
        }
    }

    /// Splices a detached task right behind the current one, so the next
    /// yield transfers control to it. Used by wake-style primitives to hand
    /// a slot directly to a specific waiter.
    ///
    /// # Safety
    ///
    /// Must be called from a running fiber; `task` must be detached, pinned
    /// and live.
    pub(crate) unsafe fn run_next(&self, task: TaskPtr) {
        let cur = self.current.get();
        debug_assert!(!cur.is_null());
        unsafe {
            (*task).scheduler.set(self as *const Scheduler);
            (*task).next.set((*cur).next.get());
            (*cur).next.set(task);
        }
    }

    /// Unlinks the currently executing task from the run queue and marks it
    /// detached. The caller must immediately jump away via
    /// [`jump_from_detached`](Scheduler::jump_from_detached).
    ///
    /// # Safety
    ///
    /// Must be called from the task being removed.
    pub(crate) unsafe fn remove_current(&self) -> TaskPtr {
        let cur = self.current.get();
        debug_assert!(!cur.is_null());
        unsafe {
            if (*cur).next.get() == cur {
                self.last.set(ptr::null_mut());
            } else {
                // `last` is the predecessor of `current`.
                (*self.last.get()).next.set((*cur).next.get());
            }
            (*cur).scheduler.set(ptr::null());
            (*cur).next.set(ptr::null_mut());
        }
        cur
    }

    /// Transfers control from a just-detached task to the new queue head,
    /// or back to the `run()` caller when the queue drained. Returns when
    /// (and if) `from` is scheduled and reached again.
    ///
    /// # Safety
    ///
    /// `from` must be the task that was just detached via
    /// [`remove_current`](Scheduler::remove_current) and must be the fiber
    /// executing this call.
    pub(crate) unsafe fn jump_from_detached(&self, from: TaskPtr) {
        let last = self.last.get();
        unsafe {
            if last.is_null() {
                self.current.set(ptr::null_mut());
                arch::switch((*from).ctx.sp_slot(), self.main_sp.as_ptr());
            } else {
                let next = (*last).next.get();
                self.current.set(next);
                arch::switch((*from).ctx.sp_slot(), (*next).ctx.sp_slot());
            }
        }
    }

    /// Detaches the current task for good and jumps to the next fiber.
    /// Called by the entry trampolines when a fiber's closure returns;
    /// never returns to the caller.
    pub(crate) unsafe fn unschedule() -> ! {
        let sched = unsafe { &*Self::instance() };
        unsafe {
            let dead = sched.remove_current();
            assert!(
                !(*dead).ctx.stack_overflow(),
                "fiber stack overflow detected"
            );
            trace!("scheduler: fiber finished");
            sched.jump_from_detached(dead);
        }
        unreachable!("finished fiber resumed without a restart")
    }
}
