//! Single-assignment deferred values with continuation chaining
//!
//! A [`Deferred`] starts empty and is completed exactly once. Continuations
//! registered with [`then`](Deferred::then), [`map`](Deferred::map),
//! [`async_map`](Deferred::async_map) and [`weak_map`](Deferred::weak_map)
//! run in registration order once the value is available.
//!
//! # Scheduling
//! Nothing is deferred implicitly: completing runs every registered
//! continuation before [`complete`](Deferred::complete) returns, and a
//! continuation registered on an already-completed deferred runs before the
//! registering call returns. A continuation registered while the deferred is
//! still running earlier continuations is appended and runs after them.

use crate::error::DeferredError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Continuation<T> = Box<dyn FnOnce(Arc<T>) + Send>;

struct State<T> {
    value: Option<Arc<T>>,
    continuations: VecDeque<Continuation<T>>,
    draining: bool,
}

/// Complete-once value handle
///
/// Cloning yields another handle to the same slot.
pub struct Deferred<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// Create an empty deferred
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                value: None,
                continuations: VecDeque::new(),
                draining: false,
            })),
        }
    }

    /// Create a deferred that is already complete
    #[must_use]
    pub fn completed(value: T) -> Self {
        let deferred = Self::new();
        let _ = deferred.complete(value);
        deferred
    }

    /// Spawn `future` on the current tokio runtime and complete with its output
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let deferred = Self::new();
        let target = deferred.clone();
        tokio::spawn(async move {
            let value = future.await;
            let _ = target.complete(value);
        });
        deferred
    }

    /// Complete with `value`, running all registered continuations
    ///
    /// # Errors
    /// `DeferredError::AlreadyCompleted` if a value was already set; the
    /// first value is kept.
    pub fn complete(&self, value: T) -> Result<(), DeferredError> {
        self.complete_shared(Arc::new(value))
    }

    fn complete_shared(&self, value: Arc<T>) -> Result<(), DeferredError> {
        {
            let mut state = self.state.lock();
            if state.value.is_some() {
                drop(state);
                tracing::error!("deferred completed more than once");
                return Err(DeferredError::AlreadyCompleted);
            }
            state.value = Some(Arc::clone(&value));
            state.draining = true;
        }

        loop {
            let next = {
                let mut state = self.state.lock();
                if let Some(next) = state.continuations.pop_front() {
                    next
                } else {
                    state.draining = false;
                    break;
                }
            };
            next(Arc::clone(&value));
        }
        Ok(())
    }

    fn then_shared<F>(&self, continuation: F)
    where
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(value) = state.value.clone() {
            if !state.draining {
                drop(state);
                continuation(value);
                return;
            }
        }
        state.continuations.push_back(Box::new(continuation));
    }

    /// Run `continuation` once the value is available
    pub fn then<F>(&self, continuation: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.then_shared(move |value| continuation(&value));
    }

    /// Derive a deferred completed with `f(value)`
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let out = Deferred::new();
        let target = out.clone();
        self.then(move |value| {
            let _ = target.complete(f(value));
        });
        out
    }

    /// Chain to the deferred returned by `f`
    #[must_use]
    pub fn async_map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> Deferred<U> + Send + 'static,
    {
        let out = Deferred::new();
        let target = out.clone();
        self.then(move |value| {
            f(value).then_shared(move |inner| {
                let _ = target.complete_shared(inner);
            });
        });
        out
    }

    /// Like [`map`](Self::map), but skipped when `owner` was dropped
    ///
    /// A skipped continuation leaves the returned deferred incomplete.
    #[must_use]
    pub fn weak_map<O, U, F>(&self, owner: &Arc<O>, f: F) -> Deferred<U>
    where
        O: Send + Sync + 'static,
        U: Send + Sync + 'static,
        F: FnOnce(&O, &T) -> U + Send + 'static,
    {
        let owner = Arc::downgrade(owner);
        let out = Deferred::new();
        let target = out.clone();
        self.then(move |value| match owner.upgrade() {
            Some(owner) => {
                let _ = target.complete(f(&owner, value));
            }
            None => tracing::debug!("continuation owner dropped, skipping"),
        });
        out
    }

    /// Check if a value was set
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.lock().value.is_some()
    }

    /// Shared handle to the value, if complete
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<Arc<T>> {
        self.state.lock().value.clone()
    }
}

impl<T: Send + Sync + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Deferred")
            .field("complete", &state.value.is_some())
            .field("continuations", &state.continuations.len())
            .finish()
    }
}

/// Deferred resolved once every input completed
///
/// Input values are not collected; callers re-read whatever state the
/// inputs wrote.
pub fn wait_all<T, I>(deferreds: I) -> Deferred<()>
where
    T: Send + Sync + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let counter = crate::flow::FlowCounter::new();
    for deferred in deferreds {
        counter.begin();
        let counter = counter.clone();
        deferred.then(move |_| counter.end());
    }
    counter.when_idle()
}

/// Future awaiting a [`Deferred`]
///
/// Resolves to `DeferredError::Abandoned` when every handle to the deferred
/// was dropped without completing it.
#[derive(Debug)]
pub struct DeferredFuture<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for DeferredFuture<T> {
    type Output = Result<T, DeferredError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| DeferredError::Abandoned))
    }
}

impl<T: Clone + Send + Sync + 'static> IntoFuture for Deferred<T> {
    type Output = Result<T, DeferredError>;
    type IntoFuture = DeferredFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let (tx, rx) = oneshot::channel();
        self.then(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        DeferredFuture { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuations_run_in_registration_order() {
        let deferred = Deferred::<u32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = Arc::clone(&order);
            deferred.then(move |value| order.lock().push((id, *value)));
        }
        assert!(order.lock().is_empty());

        deferred.complete(9).unwrap();
        assert_eq!(*order.lock(), vec![(0, 9), (1, 9), (2, 9)]);
    }

    #[test]
    fn then_on_completed_runs_synchronously() {
        let deferred = Deferred::completed("ready".to_string());
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        deferred.then(move |value| *slot.lock() = Some(value.clone()));
        assert_eq!(seen.lock().as_deref(), Some("ready"));
    }

    #[test]
    fn continuation_registered_while_draining_runs_after_earlier_ones() {
        let deferred = Deferred::<()>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handle = deferred.clone();
        let log = Arc::clone(&order);
        deferred.then(move |()| {
            log.lock().push("first");
            let log = Arc::clone(&log);
            handle.then(move |()| log.lock().push("nested"));
        });
        let log = Arc::clone(&order);
        deferred.then(move |()| log.lock().push("second"));

        deferred.complete(()).unwrap();
        assert_eq!(*order.lock(), vec!["first", "second", "nested"]);
    }

    #[test]
    fn second_complete_is_rejected() {
        let deferred = Deferred::new();
        deferred.complete(1).unwrap();
        assert_eq!(deferred.complete(2), Err(DeferredError::AlreadyCompleted));
        assert_eq!(deferred.value().as_deref(), Some(&1));
    }

    #[test]
    fn map_and_async_map_chain() {
        let source = Deferred::<u32>::new();
        let doubled = source.map(|value| value * 2);

        let inner = Deferred::<String>::new();
        let inner_handle = inner.clone();
        let described = doubled.async_map(move |_| inner_handle);

        source.complete(21).unwrap();
        assert_eq!(doubled.value().as_deref(), Some(&42));
        assert!(!described.is_complete());

        inner.complete("forty-two".to_string()).unwrap();
        assert_eq!(described.value().as_deref().map(String::as_str), Some("forty-two"));
    }

    #[test]
    fn weak_map_skips_dropped_owner() {
        let owner = Arc::new(5_u32);
        let source = Deferred::<u32>::new();
        let alive = source.map(|value| *value);
        let mapped = source.weak_map(&owner, |owner, value| owner + value);

        drop(owner);
        source.complete(1).unwrap();

        assert!(alive.is_complete());
        assert!(!mapped.is_complete());
    }

    #[test]
    fn wait_all_resolves_after_last_input() {
        let inputs: Vec<Deferred<()>> = (0..3).map(|_| Deferred::new()).collect();
        let all = wait_all(inputs.clone());

        inputs[2].complete(()).unwrap();
        inputs[0].complete(()).unwrap();
        assert!(!all.is_complete());

        inputs[1].complete(()).unwrap();
        assert!(all.is_complete());
        assert!(wait_all(Vec::<Deferred<()>>::new()).is_complete());
    }

    #[tokio::test]
    async fn await_resolves_and_reports_abandoned() {
        let deferred = Deferred::from_future(async { 7_u64 });
        assert_eq!(deferred.await, Ok(7));

        let abandoned = Deferred::<u64>::new();
        let future = abandoned.into_future();
        assert_eq!(future.await, Err(DeferredError::Abandoned));
    }
}
