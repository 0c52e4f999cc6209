//! Single-consumption flag shared between racing callbacks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag that exactly one holder can take
///
/// Used when a completion callback races a timer: whichever fires first
/// calls [`take`](Self::take) and proceeds, the other sees `false` and
/// does nothing.
#[derive(Debug, Clone, Default)]
pub struct SingleUse(Arc<AtomicBool>);

impl SingleUse {
    /// Create an untaken guard
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard; `true` only for the first caller
    #[inline]
    pub fn take(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Check if some holder already took the guard
    #[inline]
    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
