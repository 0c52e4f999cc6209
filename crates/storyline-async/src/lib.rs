//! Storyline async primitives
//!
//! The sequencing layer shared by storage and the story runtime:
//! - [`OperationQueue`]: strict FIFO, one operation at a time
//! - [`OperationCollection`]: concurrent members with fan-in
//! - [`Deferred`]: complete-once values with `then`/`map`/`async_map`/`weak_map`
//! - [`WatcherList`]: ordered callbacks that unsubscribe by return value
//! - [`FlowCounter`], [`SingleUse`], [`with_timeout`]: pending counts and races
//!
//! # Example
//!
//! ```rust,ignore
//! use storyline_async::OperationQueue;
//!
//! let queue = OperationQueue::new("story");
//! let first = queue.run("first", async { 1 });
//! let second = queue.run("second", async { 2 });
//! assert_eq!(second.await?, 2); // `first` finished before `second` started
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod collection;
mod deferred;
mod error;
mod flow;
mod guard;
mod operation;
mod queue;
mod timeout;
mod watcher;

pub use collection::OperationCollection;
pub use deferred::{wait_all, Deferred, DeferredFuture};
pub use error::DeferredError;
pub use flow::FlowCounter;
pub use guard::SingleUse;
pub use operation::{FutureOperation, Operation};
pub use queue::OperationQueue;
pub use timeout::{with_timeout, Bounded};
pub use watcher::{WatchAction, WatcherList};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
