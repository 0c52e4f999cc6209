//! Concurrent operation set with fan-in

use crate::deferred::Deferred;
use crate::flow::FlowCounter;
use crate::operation::{FutureOperation, Job, Operation};
use std::borrow::Cow;
use std::future::Future;

/// Unordered set of concurrently running operations
///
/// Every member starts as soon as it is added and is pruned when its result
/// callback returns. [`wait_idle`](Self::wait_idle) resolves once the set is
/// empty, so the concurrent step can be followed by a serialized one.
#[derive(Debug, Clone)]
pub struct OperationCollection {
    label: String,
    active: FlowCounter,
}

impl OperationCollection {
    /// Create empty collection
    #[inline]
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            active: FlowCounter::new(),
        }
    }

    /// Start `operation` now; `done` receives its output
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn add<O, D>(&self, operation: O, done: D)
    where
        O: Operation,
        D: FnOnce(O::Output) + Send + 'static,
    {
        let job = Job::new(operation, done);
        tracing::debug!(collection = %self.label, operation = %job.name, "operation started");
        self.active.begin();
        let active = self.active.clone();
        tokio::spawn(async move {
            job.work.await;
            active.end();
        });
    }

    /// Start `operation` now and return a deferred for its output
    #[must_use]
    pub fn enqueue<O>(&self, operation: O) -> Deferred<O::Output>
    where
        O: Operation,
        O::Output: Sync,
    {
        let result = Deferred::new();
        let target = result.clone();
        self.add(operation, move |output| {
            let _ = target.complete(output);
        });
        result
    }

    /// Start `future` as an operation called `name`
    #[must_use]
    pub fn run<F>(&self, name: impl Into<Cow<'static, str>>, future: F) -> Deferred<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + Sync + 'static,
    {
        self.enqueue(FutureOperation::new(name, future))
    }

    /// Operations still running
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.pending()
    }

    /// Check if no operation is running
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_idle()
    }

    /// Deferred completed the next time the collection is empty
    #[must_use]
    pub fn wait_idle(&self) -> Deferred<()> {
        self.active.when_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn members_run_concurrently_and_fan_in() {
        let collection = OperationCollection::new("teardown");
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let _ = collection.run("member", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        assert_eq!(collection.len(), 4);

        collection.wait_idle().await.unwrap();
        assert!(collection.is_empty());
        assert!(peak.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn empty_collection_is_idle() {
        let collection = OperationCollection::new("empty");
        assert!(collection.wait_idle().is_complete());
    }
}
