//! Replicated key-value store interface
//!
//! [`Store`] is the narrow surface storage needs from the replicated store:
//! point reads, prefix scans, atomic batches, and a change stream that
//! reports every mutation regardless of which writer made it.
//!
//! [`MemoryStore`] is an in-process implementation. Several storage
//! instances sharing one `MemoryStore` behave like peers on one page.

use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// One observed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Key that changed
    pub key: String,
    /// New value, `None` if the key was deleted
    pub value: Option<Vec<u8>>,
}

/// Single mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set key to value
    Put(String, Vec<u8>),
    /// Remove key
    Delete(String),
}

/// Mutations applied all together or not at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create empty batch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a put
    #[inline]
    #[must_use]
    pub fn put(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.ops.push(BatchOp::Put(key.into(), value));
        self
    }

    /// Add a delete
    #[inline]
    #[must_use]
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(BatchOp::Delete(key.into()));
        self
    }

    /// Mutations in order
    #[inline]
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Check if the batch has no mutations
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Replicated key-value store
///
/// Implementations must not report a change for a put that leaves the value
/// unchanged. Changes committed in one batch are reported in batch order.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Read one key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read every key starting with `prefix`, in key order
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Apply `batch` atomically
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Write one key
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.commit(WriteBatch::new().put(key, value)).await
    }

    /// Remove one key
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.commit(WriteBatch::new().delete(key)).await
    }

    /// Stream of changes to keys starting with `prefix`
    fn watch(&self, prefix: &str) -> mpsc::UnboundedReceiver<StoreChange>;
}

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<String, Vec<u8>>,
    watchers: Vec<(String, mpsc::UnboundedSender<StoreChange>)>,
    notifications_muted: bool,
    reject_commits: Option<String>,
    reject_reads: Option<String>,
}

/// In-memory [`Store`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop (or resume) delivering change notifications
    ///
    /// While muted, writes are applied but never reported, the way a store
    /// may silently drop a notification.
    pub fn set_notifications_muted(&self, muted: bool) {
        self.state.lock().notifications_muted = muted;
    }

    /// Reject every commit with `reason` until cleared with `None`
    pub fn set_reject_commits(&self, reason: Option<String>) {
        self.state.lock().reject_commits = reason;
    }

    /// Fail every read with `reason` until cleared with `None`
    pub fn set_reject_reads(&self, reason: Option<String>) {
        self.state.lock().reject_reads = reason;
    }

    /// Number of stored keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the store holds no key
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Copy of every entry, in key order
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("entries", &state.entries.len())
            .field("watchers", &state.watchers.len())
            .finish()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.state.lock();
        if let Some(reason) = &state.reject_reads {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        Ok(state.entries.get(key).cloned())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let state = self.state.lock();
        if let Some(reason) = &state.reject_reads {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_commits {
            return Err(StoreError::CommitRejected(reason.clone()));
        }

        let mut changes = Vec::new();
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => {
                    if state.entries.get(&key) != Some(&value) {
                        state.entries.insert(key.clone(), value.clone());
                        changes.push(StoreChange {
                            key,
                            value: Some(value),
                        });
                    }
                }
                BatchOp::Delete(key) => {
                    if state.entries.remove(&key).is_some() {
                        changes.push(StoreChange { key, value: None });
                    }
                }
            }
        }

        if state.notifications_muted {
            return Ok(());
        }
        for change in changes {
            state.watchers.retain(|(prefix, tx)| {
                !change.key.starts_with(prefix.as_str()) || tx.send(change.clone()).is_ok()
            });
        }
        Ok(())
    }

    fn watch(&self, prefix: &str) -> mpsc::UnboundedReceiver<StoreChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().watchers.push((prefix.to_string(), tx));
        rx
    }
}
