//! FIFO operation queue
//!
//! [`OperationQueue`] is the ordering primitive of the workspace: every
//! mutation of one entity is issued on that entity's queue, and operations
//! on one queue never overlap.

use crate::deferred::Deferred;
use crate::flow::FlowCounter;
use crate::operation::{FutureOperation, Job, Operation};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Shared {
    label: String,
    pending: FlowCounter,
}

/// Serial queue running at most one operation at a time
///
/// The next operation's `run` starts only after the previous operation's
/// result callback has returned. A driver task owns the receiving side and
/// exits once every handle to the queue is dropped and the backlog is done.
///
/// # Deadlock
/// An operation must not await another operation enqueued on its own queue:
/// the inner operation cannot start before the outer one finishes. Compose
/// the steps inside one operation instead.
#[derive(Clone)]
pub struct OperationQueue {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Job>,
}

impl OperationQueue {
    /// Create queue and spawn its driver on the current tokio runtime
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let shared = Arc::new(Shared {
            label: label.into(),
            pending: FlowCounter::new(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(Arc::clone(&shared), rx));
        Self { shared, tx }
    }

    /// Append `operation`; `done` receives its output
    pub fn add<O, D>(&self, operation: O, done: D)
    where
        O: Operation,
        D: FnOnce(O::Output) + Send + 'static,
    {
        let job = Job::new(operation, done);
        tracing::debug!(queue = %self.shared.label, operation = %job.name, "operation queued");
        self.shared.pending.begin();
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            tracing::error!(
                queue = %self.shared.label,
                operation = %job.name,
                "queue driver gone, dropping operation"
            );
            self.shared.pending.end();
        }
    }

    /// Append `operation` and return a deferred for its output
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

    /// Append `future` as an operation called `name`
    #[must_use]
    pub fn run<F>(&self, name: impl Into<Cow<'static, str>>, future: F) -> Deferred<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + Sync + 'static,
    {
        self.enqueue(FutureOperation::new(name, future))
    }

    /// Operations queued or running
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.pending.pending()
    }

    /// Check if nothing is queued or running
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.shared.pending.is_idle()
    }

    /// Deferred completed the next time the queue is empty
    #[must_use]
    pub fn drained(&self) -> Deferred<()> {
        self.shared.pending.when_idle()
    }

    /// Queue label used in logs
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.label
    }
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationQueue")
            .field("label", &self.shared.label)
            .field("pending", &self.len())
            .finish()
    }
}

async fn drive(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        tracing::debug!(queue = %shared.label, operation = %job.name, "operation started");
        job.work.await;
        tracing::debug!(queue = %shared.label, operation = %job.name, "operation finished");
        shared.pending.end();
    }
    tracing::debug!(queue = %shared.label, "queue driver exiting");
}
