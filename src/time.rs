//! Monotonic clocks consumed by the polling layer.
//!
//! Two clocks exist, millisecond and microsecond, both backed by 32-bit
//! tick counters that wrap modulo 2^32. Deltas are computed with wrapping
//! subtraction, so wrap-around is harmless as long as no single wait spans
//! more than half the counter range.
//!
//! The crate owns the counter storage; the platform drives it. A timer
//! interrupt typically calls [`MilliClock::tick`] every millisecond and
//! refreshes the microsecond counter from a free-running hardware counter
//! via [`MicroClock::set`]. Hosted tests drive both directly.

use core::marker::PhantomData;
use core::time::Duration;

/// A monotonic 32-bit tick clock.
pub trait Clock: Sized {
    /// Length of one tick in nanoseconds.
    const NANOS_PER_TICK: u64;

    /// Current value of this clock.
    fn now() -> Instant<Self>;

    /// Number of ticks covering `duration`, rounded up to the next full
    /// tick. Durations beyond the 32-bit tick range are not representable.
    fn ticks_for(duration: Duration) -> u32 {
        let nanos = duration.as_nanos();
        let per_tick = Self::NANOS_PER_TICK as u128;
        ((nanos + per_tick - 1) / per_tick) as u32
    }
}

/// A point in time of clock `C`, wrapping modulo 2^32 ticks.
pub struct Instant<C> {
    ticks: u32,
    _clock: PhantomData<C>,
}

impl<C> Instant<C> {
    pub const fn from_ticks(ticks: u32) -> Self {
        Self {
            ticks,
            _clock: PhantomData,
        }
    }

    pub const fn ticks(self) -> u32 {
        self.ticks
    }

    /// Ticks elapsed from `earlier` to `self`, wrapping.
    pub const fn ticks_since(self, earlier: Self) -> u32 {
        self.ticks.wrapping_sub(earlier.ticks)
    }
}

impl<C: Clock> core::ops::Add<Duration> for Instant<C> {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        Self::from_ticks(self.ticks.wrapping_add(C::ticks_for(duration)))
    }
}

// Manual impls: deriving would needlessly bound `C`.
impl<C> Clone for Instant<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Instant<C> {}

impl<C> PartialEq for Instant<C> {
    fn eq(&self, other: &Self) -> bool {
        self.ticks == other.ticks
    }
}

impl<C> Eq for Instant<C> {}

impl<C> core::fmt::Debug for Instant<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Instant({})", self.ticks)
    }
}

#[cfg(any(test, feature = "std-shim"))]
mod ticks {
    use core::cell::Cell;

    std::thread_local! {
        static MILLI: Cell<u32> = const { Cell::new(0) };
        static MICRO: Cell<u32> = const { Cell::new(0) };
    }

    pub(super) fn milli() -> u32 {
        MILLI.with(Cell::get)
    }

    pub(super) fn milli_add(ticks: u32) {
        MILLI.with(|t| t.set(t.get().wrapping_add(ticks)));
    }

    pub(super) fn milli_set(ticks: u32) {
        MILLI.with(|t| t.set(ticks));
    }

    pub(super) fn micro() -> u32 {
        MICRO.with(Cell::get)
    }

    pub(super) fn micro_add(ticks: u32) {
        MICRO.with(|t| t.set(t.get().wrapping_add(ticks)));
    }

    pub(super) fn micro_set(ticks: u32) {
        MICRO.with(|t| t.set(ticks));
    }
}

#[cfg(not(any(test, feature = "std-shim")))]
mod ticks {
    use portable_atomic::{AtomicU32, Ordering};

    static MILLI: AtomicU32 = AtomicU32::new(0);
    static MICRO: AtomicU32 = AtomicU32::new(0);

    pub(super) fn milli() -> u32 {
        MILLI.load(Ordering::Relaxed)
    }

    pub(super) fn milli_add(ticks: u32) {
        MILLI.fetch_add(ticks, Ordering::Relaxed);
    }

    pub(super) fn milli_set(ticks: u32) {
        MILLI.store(ticks, Ordering::Relaxed);
    }

    pub(super) fn micro() -> u32 {
        MICRO.load(Ordering::Relaxed)
    }

    pub(super) fn micro_add(ticks: u32) {
        MICRO.fetch_add(ticks, Ordering::Relaxed);
    }

    pub(super) fn micro_set(ticks: u32) {
        MICRO.store(ticks, Ordering::Relaxed);
    }
}

/// The millisecond clock.
pub struct MilliClock;

impl MilliClock {
    /// Advance by one millisecond. Call this from the platform timer
    /// interrupt; it is interrupt-safe.
    #[inline]
    pub fn tick() {
        ticks::milli_add(1);
    }

    /// Advance by `ticks` milliseconds.
    #[inline]
    pub fn advance(ticks: u32) {
        ticks::milli_add(ticks);
    }

    /// Overwrite the counter. Intended for platform initialization and
    /// mock-clock tests.
    #[inline]
    pub fn set(ticks: u32) {
        ticks::milli_set(ticks);
    }
}

impl Clock for MilliClock {
    const NANOS_PER_TICK: u64 = 1_000_000;

    fn now() -> Instant<Self> {
        Instant::from_ticks(ticks::milli())
    }
}

/// The microsecond clock.
pub struct MicroClock;

impl MicroClock {
    /// Advance by `ticks` microseconds.
    #[inline]
    pub fn advance(ticks: u32) {
        ticks::micro_add(ticks);
    }

    /// Overwrite the counter, typically from a free-running hardware
    /// counter.
    #[inline]
    pub fn set(ticks: u32) {
        ticks::micro_set(ticks);
    }
}

impl Clock for MicroClock {
    const NANOS_PER_TICK: u64 = 1_000;

    fn now() -> Instant<Self> {
        Instant::from_ticks(ticks::micro())
    }
}
