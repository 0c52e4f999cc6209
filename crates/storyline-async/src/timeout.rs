//! Bounded waits
//!
//! [`with_timeout`] races a deferred against a timer. A [`SingleUse`] guard
//! picks the winner. The source is not cancelled when the timer wins, its
//! late arrival is simply ignored; the timer task exits as soon as the
//! source completes.

use crate::deferred::Deferred;
use crate::guard::SingleUse;
use std::time::Duration;
use tokio::sync::oneshot;

/// Outcome of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bounded<T> {
    /// The source completed first
    Completed(T),
    /// The timer fired first
    TimedOut,
}

impl<T> Bounded<T> {
    /// Check if the timer won
    #[inline]
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Completed value, if any
    #[inline]
    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::TimedOut => None,
        }
    }
}

/// Race `source` against a `timeout` timer
///
/// # Panics
/// Panics when called outside a tokio runtime.
#[must_use]
pub fn with_timeout<T>(source: &Deferred<T>, timeout: Duration) -> Deferred<Bounded<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let out = Deferred::new();
    let guard = SingleUse::new();
    let (settled, settled_rx) = oneshot::channel::<()>();

    {
        let out = out.clone();
        let guard = guard.clone();
        source.then(move |value| {
            if guard.take() {
                let _ = out.complete(Bounded::Completed(value.clone()));
            }
            let _ = settled.send(());
        });
    }

    if !guard.is_taken() {
        let out = out.clone();
        tokio::spawn(async move {
            // A dropped sender means the source can no longer complete; keep timing.
            tokio::select! {
                () = tokio::time::sleep(timeout) => {
                    if guard.take() {
                        tracing::debug!(
                            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                            "bounded wait timed out"
                        );
                        let _ = out.complete(Bounded::TimedOut);
                    }
                }
                Ok(()) = settled_rx => {}
            }
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn completion_before_timer_wins() {
        let source = Deferred::<u8>::new();
        let bounded = with_timeout(&source, Duration::from_secs(5));

        source.complete(3).unwrap();
        assert_eq!(bounded.clone().await, Ok(Bounded::Completed(3)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(bounded.value().as_deref(), Some(&Bounded::Completed(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_wins_and_late_completion_is_ignored() {
        let source = Deferred::<u8>::new();
        let bounded = with_timeout(&source, Duration::from_millis(50));

        let outcome = bounded.clone().await.unwrap();
        assert!(outcome.is_timed_out());

        source.complete(1).unwrap();
        assert_eq!(bounded.value().as_deref(), Some(&Bounded::TimedOut));
    }

    #[tokio::test]
    async fn timer_task_exits_once_source_completes() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let baseline = metrics.num_alive_tasks();

        let source = Deferred::<u8>::new();
        let bounded = with_timeout(&source, Duration::from_secs(30));
        assert_eq!(metrics.num_alive_tasks(), baseline + 1);

        source.complete(7).unwrap();
        assert_eq!(bounded.clone().await, Ok(Bounded::Completed(7)));
        for _ in 0..20 {
            if metrics.num_alive_tasks() == baseline {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(metrics.num_alive_tasks(), baseline);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_source_still_times_out() {
        let bounded = with_timeout(&Deferred::<u8>::new(), Duration::from_millis(50));
        assert_eq!(bounded.await, Ok(Bounded::TimedOut));
    }

    #[tokio::test]
    async fn already_complete_source_skips_timer() {
        let source = Deferred::completed(());
        let bounded = with_timeout(&source, Duration::from_secs(60));
        assert_eq!(bounded.value().as_deref(), Some(&Bounded::Completed(())));
    }
}
