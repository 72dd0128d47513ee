//! x86_64 (SysV) context switching.
//!
//! Only the callee-saved register set is switched: `rbp`, `rbx` and
//! `r12`-`r15`. Everything else is caller-saved, and the switch routine is
//! reached through a regular `call`, so the compiler has already spilled
//! what it needs. The saved registers live on the suspended fiber's own
//! stack; the context structure holds nothing but the stack pointer.

use core::arch::naked_asm;

/// Bytes occupied by one synthetic register frame: six callee-saved
/// registers, the return target and a fake return address.
pub const FRAME_SIZE: usize = 8 * core::mem::size_of::<usize>();

/// Swap stacks: spill the callee-saved set onto the current stack, store the
/// stack pointer through `from`, load the stack pointer from `to` and
/// reload the callee-saved set from there. Returns in the destination
/// context as if it had been suspended at its own `switch` call.
///
/// # Safety
///
/// `from` must point to a writable stack-pointer slot. `to` must point to a
/// slot holding a stack pointer previously produced by [`init_frame`] or by
/// an earlier `switch`. Not reentrant from interrupt context.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(_from: *mut *mut usize, _to: *const *mut usize) {
    naked_asm!(
        // Spill callee-saved registers onto the outgoing stack.
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        // Swap stack pointers through the context slots.
        "mov [rdi], rsp",
        "mov rsp, [rsi]",
        // Reload the incoming fiber's callee-saved registers.
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        // For a fresh fiber this lands in `fiber_start`; for a suspended
        // fiber it resumes right after its own `switch` call.
        "ret",
    );
}

// First instruction a fresh fiber ever executes. The synthetic frame parks
// the trampoline in rbx and its argument in r12; SysV wants the argument in
// rdi. The trampoline never returns, so a plain jump suffices and the fake
// return address above us keeps the stack looking call-entered.
#[unsafe(naked)]
unsafe extern "C" fn fiber_start() {
    naked_asm!(
        "mov rdi, r12", //
        "jmp rbx",
    );
}

/// Write the synthetic frame for a fresh fiber onto its stack and return
/// the initial stack pointer.
///
/// `top` is the 16-byte aligned upper end of the usable stack region (the
/// closure, if any, lives above it). The frame is laid out so that the
/// first `switch` into it pops zeroed registers, then returns into
/// [`fiber_start`] with `rbx = trampoline` and `r12 = arg`.
///
/// # Safety
///
/// `top` must be aligned to [`super::STACK_ALIGNMENT`] and have at least
/// [`FRAME_SIZE`] writable bytes below it.
pub(crate) unsafe fn init_frame(top: *mut usize, trampoline: usize, arg: usize) -> *mut usize {
    debug_assert_eq!(top as usize % super::STACK_ALIGNMENT, 0);
    unsafe {
        let mut sp = top;

        let mut push = |value: usize| {
            sp = sp.sub(1);
            sp.write(value);
        };

        push(0); // fake return address, aligns fiber_start like a call
        push(fiber_start as usize); // ret target of the first switch
        push(0); // rbp
        push(trampoline); // rbx
        push(arg); // r12
        push(0); // r13
        push(0); // r14
        push(0); // r15

        sp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let mut stack = crate::stack::Stack::<16>::new();
        let top = stack.end();
        let sp = unsafe { init_frame(top, 0x1111, 0x2222) };

        assert_eq!(sp as usize, top as usize - FRAME_SIZE);
        // Ascending from sp: r15 r14 r13 r12 rbx rbp ret pad.
        unsafe {
            assert_eq!(sp.add(3).read(), 0x2222); // r12 = arg
            assert_eq!(sp.add(4).read(), 0x1111); // rbx = trampoline
            assert_eq!(sp.add(6).read(), fiber_start as usize);
            assert_eq!(sp.add(7).read(), 0);
        }
    }
}
