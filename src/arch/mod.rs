//! Architecture abstraction layer for stack frames and context switching.
//!
//! Each supported CPU architecture provides three things: the synthetic
//! register frame written onto a fresh fiber stack, the callee-saved
//! context-switch routine, and the entry shim that moves the trampoline
//! argument into the first argument register before tail-calling the
//! trampoline itself.

use portable_atomic::{AtomicUsize, Ordering};

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "x86_64")]
pub(crate) use x86_64::{init_frame, switch, FRAME_SIZE};

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "aarch64")]
pub(crate) use aarch64::{init_frame, switch, FRAME_SIZE};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!(
    "cofiber only supports x86_64 and aarch64. \
     Build for one of these targets, or for a host of that architecture when testing."
);

/// Stack alignment required by both supported ABIs.
///
/// SysV x86_64 and AAPCS64 both require 16-byte stack alignment; this is
/// also at least twice the pointer size, which the closure placement logic
/// relies on.
pub const STACK_ALIGNMENT: usize = 16;

/// The smallest stack a fiber can run on: one synthetic register frame plus
/// headroom for the entry shim and the trampoline call itself.
pub const STACK_MINIMUM: usize = FRAME_SIZE + 4 * core::mem::size_of::<usize>();

/// Signature of the C-ABI trampoline that a fresh fiber enters. It receives
/// a single pointer (the closure location on the fiber's own stack) in the
/// first argument register and must never return.
pub type Trampoline = unsafe extern "C" fn(*mut u8) -> !;

// Interrupt nesting depth, maintained by the platform's ISR glue. The
// cooperative core only ever reads it; it refuses join() and reports
// is_inside_interrupt() based on this counter.
static IRQ_NESTING: AtomicUsize = AtomicUsize::new(0);

/// Record entry into an interrupt handler.
///
/// Platform interrupt prologues must call this before any code that could
/// touch a fiber synchronization primitive, and pair it with [`irq_exit`].
#[inline]
pub fn irq_enter() {
    IRQ_NESTING.fetch_add(1, Ordering::Relaxed);
}

/// Record exit from an interrupt handler.
#[inline]
pub fn irq_exit() {
    IRQ_NESTING.fetch_sub(1, Ordering::Relaxed);
}

/// Whether execution is currently inside an interrupt handler.
#[inline]
pub fn in_interrupt() -> bool {
    IRQ_NESTING.load(Ordering::Relaxed) != 0
}
