//! Ordered subscriber lists
//!
//! Provides [`WatcherList`], an insertion-ordered set of callbacks that
//! unsubscribe themselves by returning [`WatchAction::Stop`].

use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::Arc;

/// What a watcher wants after being notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchAction {
    /// Keep the watcher registered
    Continue,
    /// Remove the watcher from the list
    Stop,
}

type Watcher<T> = Box<dyn FnMut(&T) -> WatchAction + Send>;

/// Insertion-ordered list of watcher callbacks
///
/// # Reentrancy
/// The internal lock is never held while a watcher runs. A watcher may add
/// new watchers to the same list; those are first called by the *next*
/// [`notify`](Self::notify). Cloning the list shares the same watchers, and
/// `notify` keeps its own handle so a watcher may drop the last external
/// reference to the list's owner.
pub struct WatcherList<T> {
    inner: Arc<Mutex<Vec<Watcher<T>>>>,
}

impl<T> WatcherList<T> {
    /// Create empty list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a watcher
    pub fn add<F>(&self, watcher: F)
    where
        F: FnMut(&T) -> WatchAction + Send + 'static,
    {
        self.inner.lock().push(Box::new(watcher));
    }

    /// Call every watcher in insertion order, dropping those that return
    /// [`WatchAction::Stop`]
    ///
    /// Returns the number of watchers that were called.
    pub fn notify(&self, value: &T) -> usize {
        let inner = Arc::clone(&self.inner);
        let current = mem::take(&mut *inner.lock());
        let called = current.len();

        let mut retained = Vec::with_capacity(called);
        for mut watcher in current {
            if watcher(value) == WatchAction::Continue {
                retained.push(watcher);
            }
        }

        let mut guard = inner.lock();
        let added_during_notify = mem::replace(&mut *guard, retained);
        guard.extend(added_during_notify);
        called
    }

    /// Number of registered watchers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if no watcher is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Remove every watcher
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl<T> Default for WatcherList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WatcherList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WatcherList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherList")
            .field("watchers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn stop_removes_watcher_after_first_call() {
        let list = WatcherList::<u32>::new();
        let once = Arc::new(AtomicUsize::new(0));
        let always = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&once);
        list.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            WatchAction::Stop
        });
        let counter = Arc::clone(&always);
        list.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            WatchAction::Continue
        });

        list.notify(&1);
        list.notify(&2);
        list.notify(&3);

        assert_eq!(once.load(Ordering::SeqCst), 1);
        assert_eq!(always.load(Ordering::SeqCst), 3);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn notify_preserves_insertion_order() {
        let list = WatcherList::<()>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in 0..4 {
            let seen = Arc::clone(&seen);
            list.add(move |()| {
                seen.lock().push(id);
                WatchAction::Continue
            });
        }

        list.notify(&());
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn watcher_added_during_notify_waits_for_next_pass() {
        let list = WatcherList::<u32>::new();
        let late_calls = Arc::new(AtomicUsize::new(0));

        let handle = list.clone();
        let late = Arc::clone(&late_calls);
        list.add(move |_| {
            let late = Arc::clone(&late);
            handle.add(move |_| {
                late.fetch_add(1, Ordering::SeqCst);
                WatchAction::Continue
            });
            WatchAction::Stop
        });

        assert_eq!(list.notify(&0), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        assert_eq!(list.notify(&0), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watcher_may_drop_last_owner_reference() {
        struct Owner {
            watchers: WatcherList<u32>,
        }

        let owner = Arc::new(Owner {
            watchers: WatcherList::new(),
        });
        let slot = Arc::new(Mutex::new(Some(Arc::clone(&owner))));

        let held = Arc::clone(&slot);
        owner.watchers.add(move |_| {
            held.lock().take();
            WatchAction::Stop
        });

        let list = owner.watchers.clone();
        drop(owner);
        assert_eq!(list.notify(&7), 1);
        assert!(slot.lock().is_none());
        assert!(list.is_empty());
    }
}
