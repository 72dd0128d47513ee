//! Advisory cancellation: stop state, source and token.
//!
//! [`StopState`] owns the actual flag; whoever creates it (in this crate,
//! every [`Task`](crate::Task) embeds one) hands out non-owning
//! [`StopSource`] and [`StopToken`] handles. The handles borrow the state,
//! so they can never outlive it. A defaulted handle refers to no state and
//! reports that stopping is impossible.
//!
//! Stop requests are advisory: a fiber only observes them where it polls
//! its token. Requesting and observing are interrupt-safe.

use portable_atomic::{AtomicBool, Ordering};

/// Storage and implementation of a stop request flag.
#[derive(Debug)]
pub struct StopState {
    requested: AtomicBool,
}

impl StopState {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    /// Whether a stop has been requested.
    ///
    /// Can be called from an interrupt.
    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Requests a stop. Returns `true` only for the first request.
    ///
    /// Can be called from an interrupt.
    #[inline]
    pub fn request_stop(&self) -> bool {
        !self.requested.swap(true, Ordering::Relaxed)
    }

    /// A requesting handle onto this state.
    pub fn source(&self) -> StopSource<'_> {
        StopSource { state: Some(self) }
    }

    /// An observing handle onto this state.
    pub fn token(&self) -> StopToken<'_> {
        StopToken { state: Some(self) }
    }
}

impl Default for StopState {
    fn default() -> Self {
        Self::new()
    }
}

/// Requesting handle to a [`StopState`]. Mirrors `std::stop_source`.
#[derive(Clone, Copy, Default)]
pub struct StopSource<'a> {
    state: Option<&'a StopState>,
}

impl<'a> StopSource<'a> {
    /// Whether this source refers to a stop state at all.
    pub fn stop_possible(&self) -> bool {
        self.state.is_some()
    }

    /// Whether the referred state has a pending stop request.
    pub fn stop_requested(&self) -> bool {
        self.state.is_some_and(StopState::stop_requested)
    }

    /// Requests a stop; `true` only for the first successful request.
    ///
    /// Can be called from an interrupt.
    pub fn request_stop(&self) -> bool {
        self.state.is_some_and(StopState::request_stop)
    }

    /// An observing handle onto the same state.
    pub fn token(&self) -> StopToken<'a> {
        StopToken { state: self.state }
    }
}

impl PartialEq for StopSource<'_> {
    fn eq(&self, other: &Self) -> bool {
        same_state(self.state, other.state)
    }
}

impl Eq for StopSource<'_> {}

/// Read-only handle to a [`StopState`]. Mirrors `std::stop_token`.
#[derive(Clone, Copy, Default, Debug)]
pub struct StopToken<'a> {
    state: Option<&'a StopState>,
}

impl StopToken<'_> {
    /// Whether this token refers to a stop state at all.
    pub fn stop_possible(&self) -> bool {
        self.state.is_some()
    }

    /// Whether a stop has been requested on the referred state.
    ///
    /// Can be called from an interrupt.
    pub fn stop_requested(&self) -> bool {
        self.state.is_some_and(StopState::stop_requested)
    }
}

impl PartialEq for StopToken<'_> {
    fn eq(&self, other: &Self) -> bool {
        same_state(self.state, other.state)
    }
}

impl Eq for StopToken<'_> {}

fn same_state(a: Option<&StopState>, b: Option<&StopState>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => core::ptr::eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_wins() {
        let state = StopState::new();
        assert!(!state.stop_requested());
        assert!(state.request_stop());
        assert!(!state.request_stop());
        assert!(state.stop_requested());
    }

    #[test]
    fn handles_observe_the_state() {
        let state = StopState::new();
        let source = state.source();
        let token = source.token();
        assert!(source.stop_possible());
        assert!(token.stop_possible());
        assert!(!token.stop_requested());
        assert!(source.request_stop());
        assert!(token.stop_requested());
    }

    #[test]
    fn default_handles_cannot_stop() {
        let source = StopSource::default();
        let token = StopToken::default();
        assert!(!source.stop_possible());
        assert!(!source.request_stop());
        assert!(!token.stop_possible());
        assert!(!token.stop_requested());
    }

    #[test]
    fn equality_is_by_state_identity() {
        let a = StopState::new();
        let b = StopState::new();
        assert_eq!(a.token(), a.source().token());
        assert_ne!(a.token(), b.token());
        assert_eq!(StopToken::default(), StopToken::default());
        assert_ne!(a.token(), StopToken::default());
    }
}
