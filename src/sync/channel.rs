//! Rendezvous channel between two fibers.
//!
//! The channel holds one value and a wait list shared by senders and
//! receivers; whichever side finds the slot in the wrong state parks
//! itself. Waking splices the parked fiber right behind the current one
//! and yields, so the woken side consumes (or refills) the slot before
//! anybody else can interfere. This run-queue handoff makes the channel a
//! scheduler-thread-only primitive: it must not be used from interrupts.

use core::cell::{Cell, UnsafeCell};
use core::mem::MaybeUninit;
use core::ptr;

use crate::scheduler::{Scheduler, TaskPtr};

/// Intrusive list of fibers parked on a primitive, threaded through the
/// tasks' own queue links. A parked fiber is detached from the run queue,
/// so its `next` pointer is free for the wait list to reuse.
struct WaitList {
    last: Cell<TaskPtr>,
}

impl WaitList {
    const fn new() -> Self {
        Self {
            last: Cell::new(ptr::null_mut()),
        }
    }

    /// Parks the current fiber on this list and runs the next one. Returns
    /// once a [`wake`](WaitList::wake) hands control back. A no-op without
    /// a running scheduler.
    fn wait(&self) {
        let sched = unsafe { &*Scheduler::instance() };
        if sched.current_task().is_null() {
            return;
        }
        unsafe {
            let task = sched.remove_current();
            self.push(task);
            sched.jump_from_detached(task);
        }
    }

    /// Pops the oldest waiter, reschedules it to run next and yields into
    /// it. Outside of `run()` the waiter is enqueued normally instead.
    fn wake(&self) {
        let Some(waiter) = self.pop() else {
            return;
        };
        let sched = unsafe { &*Scheduler::instance() };
        unsafe {
            if sched.current_task().is_null() {
                sched.add(waiter);
            } else {
                sched.run_next(waiter);
                sched.yield_once();
            }
        }
    }

    fn push(&self, waiter: TaskPtr) {
        let last = self.last.get();
        unsafe {
            if last.is_null() {
                (*waiter).next.set(waiter);
            } else {
                (*waiter).next.set((*last).next.get());
                (*last).next.set(waiter);
            }
        }
        self.last.set(waiter);
    }

    fn pop(&self) -> Option<TaskPtr> {
        let last = self.last.get();
        if last.is_null() {
            return None;
        }
        unsafe {
            let first = (*last).next.get();
            if first == last {
                self.last.set(ptr::null_mut());
            } else {
                (*last).next.set((*first).next.get());
            }
            (*first).next.set(ptr::null_mut());
            Some(first)
        }
    }
}

/// Single-slot message channel between fibers.
///
/// Three states: *empty* (receivers park), *full* (senders park) and
/// *ready* (the next operation completes without blocking). Without a
/// running scheduler the operations degrade to their non-blocking halves.
///
/// A fiber parked on a channel stays referenced by the channel's wait
/// list; the channel must not outlive the tasks parked on it, and a
/// parked task must not be dropped before it was woken.
pub struct Channel<T> {
    data: UnsafeCell<MaybeUninit<T>>,
    size: Cell<u16>,
    waiters: WaitList,
}

impl<T> Channel<T> {
    pub const fn new() -> Self {
        Self {
            data: UnsafeCell::new(MaybeUninit::uninit()),
            size: Cell::new(0),
            waiters: WaitList::new(),
        }
    }

    /// Whether a receive would block.
    pub fn is_empty(&self) -> bool {
        self.size.get() == 0
    }

    /// Whether a send would block.
    pub fn is_full(&self) -> bool {
        self.size.get() > 0
    }

    /// Sends a value, parking until a receiver makes room if necessary.
    pub fn send(&self, value: T) {
        if self.is_full() {
            self.waiters.wait();
        }
        debug_assert!(!self.is_full());
        unsafe { (*self.data.get()).write(value) };
        self.size.set(self.size.get() + 1);
        self.waiters.wake();
    }

    /// Receives a value, parking until a sender provides one if necessary.
    pub fn receive(&self) -> T {
        if self.is_empty() {
            self.waiters.wait();
        }
        debug_assert!(!self.is_empty());
        self.size.set(self.size.get() - 1);
        let value = unsafe { (*self.data.get()).assume_init_read() };
        self.waiters.wake();
        value
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Channel<T> {
    fn drop(&mut self) {
        if self.size.get() > 0 {
            unsafe { (*self.data.get()).assume_init_drop() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use crate::task::Task;
    use crate::testutil::StateLog;
    use core::pin::pin;

    #[test]
    fn receiver_first_blocks_until_the_send() {
        let log = StateLog::new();
        let channel = Channel::<i32>::new();
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut consumer = pin!(Task::new(&mut stack_a, || {
            log.add("consumer_start");
            assert_eq!(channel.receive(), 123);
            log.add("consumer_end");
        }));
        let mut producer = pin!(Task::new(&mut stack_b, || {
            log.add("producer_start");
            channel.send(123);
            log.add("producer_end");
        }));
        consumer.as_mut().start();
        producer.as_mut().start();
        crate::Scheduler::run();
        log.assert_order(&[
            "consumer_start",
            "producer_start",
            "consumer_end",
            "producer_end",
        ]);
        assert!(channel.is_empty());
    }

    #[test]
    fn sender_first_completes_without_blocking() {
        let log = StateLog::new();
        let channel = Channel::<i32>::new();
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut producer = pin!(Task::new(&mut stack_a, || {
            log.add("producer_start");
            channel.send(123);
            log.add("producer_end");
        }));
        let mut consumer = pin!(Task::new(&mut stack_b, || {
            log.add("consumer_start");
            assert_eq!(channel.receive(), 123);
            log.add("consumer_end");
        }));
        producer.as_mut().start();
        consumer.as_mut().start();
        crate::Scheduler::run();
        log.assert_order(&[
            "producer_start",
            "producer_end",
            "consumer_start",
            "consumer_end",
        ]);
    }

    #[test]
    fn second_sender_parks_until_the_slot_clears() {
        let log = StateLog::new();
        let channel = Channel::<u8>::new();
        let mut stack_a = Stack::<512>::new();
        let mut stack_b = Stack::<512>::new();
        let mut producer = pin!(Task::new(&mut stack_a, || {
            channel.send(1);
            log.add("sent_1");
            channel.send(2); // slot still full, parks
            log.add("sent_2");
        }));
        let mut consumer = pin!(Task::new(&mut stack_b, || {
            log.add("receiving");
            assert_eq!(channel.receive(), 1);
            log.add("got_1");
            assert_eq!(channel.receive(), 2);
            log.add("got_2");
        }));
        producer.as_mut().start();
        consumer.as_mut().start();
        crate::Scheduler::run();
        // The parked sender is woken with priority and refills the slot
        // before the receiver even returns from its first receive.
        log.assert_order(&["sent_1", "receiving", "sent_2", "got_1", "got_2"]);
    }

    #[test]
    fn sends_before_run_are_consumed_on_the_next_run() {
        let channel = Channel::<u8>::new();
        channel.send(7);
        assert!(channel.is_full());
        assert_eq!(channel.receive(), 7);
        assert!(channel.is_empty());
    }

    #[test]
    fn unconsumed_value_is_dropped_with_the_channel() {
        use std::rc::Rc;

        let value = Rc::new(());
        let channel = Channel::<Rc<()>>::new();
        channel.send(value.clone());
        assert_eq!(Rc::strong_count(&value), 2);
        drop(channel);
        assert_eq!(Rc::strong_count(&value), 1);
    }
}
