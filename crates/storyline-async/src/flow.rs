//! Explicit pending-work counting
//!
//! A [`FlowCounter`] is incremented for each asynchronous call issued and
//! decremented in the matching callback. Waiters registered through
//! [`FlowCounter::when_idle`] are released when the count returns to zero.

use crate::deferred::Deferred;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct FlowState {
    pending: usize,
    idle_waiters: Vec<Deferred<()>>,
}

/// Shared counter of outstanding asynchronous work
#[derive(Clone, Default)]
pub struct FlowCounter {
    state: Arc<Mutex<FlowState>>,
}

impl FlowCounter {
    /// Create counter with nothing pending
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more outstanding call
    pub fn begin(&self) {
        self.state.lock().pending += 1;
    }

    /// Record that one outstanding call finished
    ///
    /// Ending more calls than were begun is a defect; the extra end is
    /// logged and ignored.
    pub fn end(&self) {
        let released = {
            let mut state = self.state.lock();
            if state.pending == 0 {
                tracing::error!("flow counter ended with nothing pending");
                return;
            }
            state.pending -= 1;
            if state.pending == 0 {
                std::mem::take(&mut state.idle_waiters)
            } else {
                Vec::new()
            }
        };

        for waiter in released {
            let _ = waiter.complete(());
        }
    }

    /// Number of outstanding calls
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Check if nothing is outstanding
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Deferred completed the next time the count is zero
    ///
    /// Completes synchronously when nothing is pending.
    #[must_use]
    pub fn when_idle(&self) -> Deferred<()> {
        let mut state = self.state.lock();
        if state.pending == 0 {
            return Deferred::completed(());
        }
        let waiter = Deferred::new();
        state.idle_waiters.push(waiter.clone());
        waiter
    }
}

impl fmt::Debug for FlowCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowCounter")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_counter_completes_immediately() {
        let counter = FlowCounter::new();
        assert!(counter.when_idle().is_complete());
    }

    #[test]
    fn waiters_release_when_count_reaches_zero() {
        let counter = FlowCounter::new();
        counter.begin();
        counter.begin();

        let idle = counter.when_idle();
        counter.end();
        assert!(!idle.is_complete());
        assert_eq!(counter.pending(), 1);

        counter.end();
        assert!(idle.is_complete());
        assert!(counter.is_idle());
    }

    #[test]
    fn extra_end_is_ignored() {
        let counter = FlowCounter::new();
        counter.end();
        assert_eq!(counter.pending(), 0);
    }
}
