//! Per-fiber execution context and stack bookkeeping.
//!
//! A [`Context`] records where a suspended fiber's stack pointer is parked,
//! the bounds of its stack, and enough information to rebuild the initial
//! entry frame so a finished fiber can be restarted from scratch. The
//! watermark facility fills unused stack with a sentinel so peak usage can
//! be measured and overflow detected after the fact.

use core::cell::Cell;

use crate::arch::{self, Trampoline};

/// Sentinel written into unused stack words. Truncates cleanly on 32-bit
/// pointer widths.
const WATERMARK: usize = 0x5AFE_5AFE_5AFE_5AFEu64 as usize;

/// Saved execution state of one fiber.
///
/// The register contents themselves live on the fiber's stack; the context
/// only stores the stack pointer they were spilled under, plus the stack
/// bounds and the entry wiring needed by [`reset`](Context::reset).
pub struct Context {
    /// Stack pointer of the suspended fiber. Only meaningful while the
    /// fiber is not running.
    sp: Cell<*mut usize>,
    /// Lowest address of the stack.
    bottom: *mut usize,
    /// Upper end of the switchable stack region, below any closure storage.
    top: *mut usize,
    trampoline: usize,
    arg: *mut u8,
}

impl Context {
    /// Prepares a context so the first switch into it enters
    /// `trampoline(arg)` on the given stack.
    ///
    /// Writes the sentinel into the bottom word so
    /// [`stack_overflow`](Context::stack_overflow) is meaningful from the
    /// start, then builds the synthetic register frame just below `top`.
    ///
    /// # Safety
    ///
    /// `[bottom, top)` must be a live, exclusively owned stack region of at
    /// least [`arch::STACK_MINIMUM`] bytes, with `top` aligned to
    /// [`arch::STACK_ALIGNMENT`].
    pub(crate) unsafe fn init(
        bottom: *mut usize,
        top: *mut usize,
        trampoline: Trampoline,
        arg: *mut u8,
    ) -> Self {
        let ctx = Self {
            sp: Cell::new(core::ptr::null_mut()),
            bottom,
            top,
            trampoline: trampoline as usize,
            arg,
        };
        unsafe {
            ctx.bottom.write(WATERMARK);
            ctx.reset();
        }
        ctx
    }

    /// Rebuilds the initial entry frame, so the next switch into this
    /// context restarts the fiber from its trampoline.
    ///
    /// # Safety
    ///
    /// The fiber must not be running or scheduled.
    pub(crate) unsafe fn reset(&self) {
        let sp = unsafe { arch::init_frame(self.top, self.trampoline, self.arg as usize) };
        self.sp.set(sp);
    }

    /// Slot holding the saved stack pointer, as consumed by `arch::switch`.
    pub(crate) fn sp_slot(&self) -> *mut *mut usize {
        self.sp.as_ptr()
    }

    /// Fills the stack between its bottom and the saved stack pointer with
    /// the sentinel pattern, enabling [`stack_usage`](Context::stack_usage).
    ///
    /// Must only be called while the fiber is suspended (or before it first
    /// runs); the saved stack pointer is stale while the fiber executes.
    pub fn watermark(&self) {
        let mut word = self.bottom;
        let sp = self.sp.get();
        while word < sp {
            unsafe { word.write(WATERMARK) };
            word = unsafe { word.add(1) };
        }
    }

    /// Peak stack usage in bytes, measured against the watermark.
    ///
    /// Scans from the bottom for the first word that no longer carries the
    /// sentinel; everything above it counts as used.
    pub fn stack_usage(&self) -> usize {
        let mut word = self.bottom;
        while word < self.top && unsafe { word.read() } == WATERMARK {
            word = unsafe { word.add(1) };
        }
        self.top as usize - word as usize
    }

    /// Whether the bottom stack word was overwritten. The bottom word holds
    /// the sentinel from initialization onward, so losing it means the
    /// fiber ran out of stack at least once.
    pub fn stack_overflow(&self) -> bool {
        unsafe { self.bottom.read() != WATERMARK }
    }
}
