//! Fixed-size, caller-provided fiber stacks.
//!
//! A [`Stack`] is nothing but aligned storage. The runtime never writes to
//! its fields after construction; it only derives the base and end pointers
//! from it. Stacks are measured in machine words so the backing array can
//! be expressed with a stable const generic.

use core::mem::MaybeUninit;

use crate::arch::{STACK_ALIGNMENT, STACK_MINIMUM};

/// Default stack capacity: 1 KiB worth of words on a 64-bit target.
pub const DEFAULT_STACK_WORDS: usize = 128;

/// Aligned storage for one fiber's stack, `WORDS` machine words in size.
///
/// A stack must be unique per [`Task`](crate::Task); the borrow taken by
/// `Task::new` enforces that. The memory is deliberately uninitialized:
/// fibers write it before reading, and the watermark facility fills it with
/// a sentinel pattern on demand.
#[repr(align(16))]
pub struct Stack<const WORDS: usize = DEFAULT_STACK_WORDS> {
    data: [MaybeUninit<usize>; WORDS],
}

impl<const WORDS: usize> Stack<WORDS> {
    /// Smallest usable capacity in words, imposed by the context-switch ABI.
    pub const MIN_WORDS: usize = STACK_MINIMUM / core::mem::size_of::<usize>();

    /// Creates an uninitialized stack.
    pub const fn new() -> Self {
        const {
            assert!(
                WORDS * core::mem::size_of::<usize>() >= STACK_MINIMUM,
                "stack is smaller than the minimum register frame"
            );
        }
        Self {
            data: [MaybeUninit::uninit(); WORDS],
        }
    }

    /// Capacity in machine words.
    pub const fn words(&self) -> usize {
        WORDS
    }

    /// Capacity in bytes.
    pub const fn size(&self) -> usize {
        WORDS * core::mem::size_of::<usize>()
    }

    /// Lowest address of the stack region.
    pub fn memory(&mut self) -> *mut usize {
        self.data.as_mut_ptr().cast()
    }

    /// One past the highest address of the stack region. Always aligned to
    /// [`STACK_ALIGNMENT`] because the storage itself is.
    pub fn end(&mut self) -> *mut usize {
        unsafe { self.memory().add(WORDS) }
    }
}

impl<const WORDS: usize> Default for Stack<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_and_capacity() {
        let mut stack = Stack::<64>::new();
        let base = stack.memory() as usize;
        assert_eq!(base % STACK_ALIGNMENT, 0);
        assert_eq!(stack.words(), 64);
        assert_eq!(stack.size(), 64 * core::mem::size_of::<usize>());
        assert_eq!(stack.end() as usize - base, stack.size());
    }

    #[test]
    fn default_is_one_kib_of_words() {
        let stack: Stack = Stack::default();
        assert_eq!(stack.words(), DEFAULT_STACK_WORDS);
    }
}
