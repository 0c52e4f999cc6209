//! Units of asynchronous work
//!
//! An [`Operation`] is a named piece of work whose result is delivered to
//! its owner exactly once. Failure is part of the output type; operations
//! do not panic to signal errors.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;

/// Named asynchronous unit of work
///
/// Owners ([`OperationQueue`](crate::OperationQueue),
/// [`OperationCollection`](crate::OperationCollection)) call
/// [`run`](Self::run) and hand the output to the result callback they were
/// given.
#[async_trait]
pub trait Operation: Send + 'static {
    /// Result delivered to the owner
    type Output: Send + 'static;

    /// Name used in logs
    fn name(&self) -> &str;

    /// Perform the work
    async fn run(self: Box<Self>) -> Self::Output;
}

/// Operation wrapping a future
pub struct FutureOperation<F> {
    name: Cow<'static, str>,
    future: F,
}

impl<F> FutureOperation<F> {
    /// Wrap `future` as an operation called `name`
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, future: F) -> Self {
        Self {
            name: name.into(),
            future,
        }
    }
}

impl<F> fmt::Debug for FutureOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureOperation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Operation for FutureOperation<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>) -> F::Output {
        self.future.await
    }
}

/// Type-erased operation plus its result callback
pub(crate) struct Job {
    pub(crate) name: String,
    pub(crate) work: BoxFuture<'static, ()>,
}

impl Job {
    /// Erase `operation`; `done` runs with the output before the job resolves
    pub(crate) fn new<O, D>(operation: O, done: D) -> Self
    where
        O: Operation,
        D: FnOnce(O::Output) + Send + 'static,
    {
        let name = operation.name().to_owned();
        let work = async move {
            let output = Box::new(operation).run().await;
            done(output);
        }
        .boxed();
        Self { name, work }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Add(u32, u32);

    #[async_trait]
    impl Operation for Add {
        type Output = u32;

        fn name(&self) -> &str {
            "add"
        }

        async fn run(self: Box<Self>) -> u32 {
            self.0 + self.1
        }
    }

    #[tokio::test]
    async fn operation_runs_through_job() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let job = Job::new(Add(2, 3), move |sum| {
            let _ = tx.send(sum);
        });
        assert_eq!(job.name, "add");

        job.work.await;
        assert_eq!(rx.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn future_operation_keeps_name() {
        let op = FutureOperation::new("greet", async { "hello" });
        assert_eq!(op.name(), "greet");
        assert_eq!(Box::new(op).run().await, "hello");
    }
}
