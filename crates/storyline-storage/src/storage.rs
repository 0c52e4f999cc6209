//! Story storage with write confirmation
//!
//! [`StoryStorage`] reads and writes one story's module records, link values
//! and typed entity blobs on a replicated [`Store`]. Every public operation
//! runs on the instance's single [`OperationQueue`], so two calls on one
//! instance never interleave their read-modify-write steps.
//!
//! # Confirmation
//! A write is complete once the store's change stream reports the exact
//! value that was written. Writes that would not change the stored bytes are
//! skipped and complete immediately, since the store never reports them.
//! Waiting is bounded by [`StorageConfig::write_timeout`].
//!
//! # Dispatch
//! A watch task consumes the change stream. For each change it first
//! releases matching pending writes, then fans the change out to module,
//! entity or link subscribers. Subscribers always run without any storage
//! lock held.

use crate::codec;
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::keys::{self, KeyKind};
use crate::link::{LinkPath, LinkUpdate, WriterId};
use crate::path::ModulePath;
use crate::pending::{PendingId, PendingWrites, WriteDone};
use crate::record::ModuleRecord;
use crate::store::{Store, StoreChange, WriteBatch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use storyline_async::{with_timeout, Bounded, Deferred, OperationQueue, WatchAction, WatcherList};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
struct EntityChange {
    entity_type: String,
    data: Vec<u8>,
}

/// Result of issuing a write
#[derive(Debug, Clone)]
enum Confirmation {
    /// Nothing to write
    Unchanged,
    /// Completes when the store reports the write (or the bound expires)
    Pending(WriteDone),
}

impl Confirmation {
    async fn wait(self) -> Result<(), StorageError> {
        match self {
            Self::Unchanged => Ok(()),
            Self::Pending(done) => done.await?,
        }
    }
}

struct LinkWatchers {
    link: LinkPath,
    watchers: WatcherList<LinkUpdate>,
}

#[derive(Default)]
struct State {
    pending: PendingWrites,
    links: HashMap<String, LinkWatchers>,
    entities: HashMap<String, WatcherList<EntityChange>>,
    entity_types: HashMap<String, String>,
}

struct Inner {
    label: String,
    store: Arc<dyn Store>,
    queue: OperationQueue,
    config: StorageConfig,
    state: Mutex<State>,
    module_watchers: WatcherList<ModuleRecord>,
    // Dropping the sender stops the watch task.
    _shutdown: oneshot::Sender<()>,
}

/// Storage of one story
///
/// Cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct StoryStorage {
    inner: Arc<Inner>,
}

impl StoryStorage {
    /// Create storage on `store` and start watching its changes
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(label: impl Into<String>, store: Arc<dyn Store>, config: StorageConfig) -> Self {
        let label = label.into();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let changes = store.watch("");
        let inner = Arc::new(Inner {
            queue: OperationQueue::new(format!("storage:{label}")),
            label,
            store,
            config,
            state: Mutex::new(State::default()),
            module_watchers: WatcherList::new(),
            _shutdown: shutdown_tx,
        });
        tokio::spawn(watch_changes(Arc::downgrade(&inner), changes, shutdown_rx));
        Self { inner }
    }

    /// Upsert `record` at its path
    ///
    /// Writing a record replaces any tombstone at its path; this is the
    /// explicit way back from deleted.
    ///
    /// # Errors
    /// `StorageError::InvalidPath` for the root or an empty segment,
    /// otherwise store, codec or confirmation failures.
    pub async fn write_module_record(&self, record: ModuleRecord) -> Result<(), StorageError> {
        let inner = Arc::clone(&self.inner);
        let confirmation = self
            .inner
            .queue
            .run("write_module_record", async move {
                inner.write_module_record(record).await
            })
            .await??;
        confirmation.wait().await
    }

    /// Read-modify-write of the record at `path`
    ///
    /// `mutate` sees the current record (or `None`). Leaving `None` where a
    /// record exists, or changing the record's path, is rejected. A deleted
    /// record stays deleted unless `mutate` only clears the flag on the
    /// record it received; a replacement value keeps the tombstone.
    ///
    /// # Errors
    /// `StorageError::InvalidPath` for the root or an empty segment,
    /// `StorageError::InvalidMutation` for a rejected mutation, otherwise
    /// store, codec or confirmation failures.
    pub async fn update_module_record<F>(
        &self,
        path: ModulePath,
        mutate: F,
    ) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Option<ModuleRecord>) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let confirmation = self
            .inner
            .queue
            .run("update_module_record", async move {
                inner.update_module_record(path, mutate).await
            })
            .await??;
        confirmation.wait().await
    }

    /// Record at `path`, if any
    ///
    /// # Errors
    /// Store or codec failures.
    pub async fn read_module_record(
        &self,
        path: &ModulePath,
    ) -> Result<Option<ModuleRecord>, StorageError> {
        let inner = Arc::clone(&self.inner);
        let key = keys::module_key(path);
        self.inner
            .queue
            .run("read_module_record", async move { inner.read_module_record(&key).await })
            .await?
    }

    /// Every decodable record, in key order
    ///
    /// # Errors
    /// Store failures. Records that fail to decode are logged and skipped.
    pub async fn read_all_module_records(&self) -> Result<Vec<ModuleRecord>, StorageError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .run("read_all_module_records", async move {
                inner.read_all_module_records().await
            })
            .await?
    }

    /// Read-modify-write of a link value on behalf of `writer`
    ///
    /// Leaving `None` removes the link value.
    ///
    /// # Errors
    /// `StorageError::InvalidContext` for the nil writer, otherwise store or
    /// confirmation failures.
    pub async fn update_link_value<F>(
        &self,
        link: LinkPath,
        mutate: F,
        writer: WriterId,
    ) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Option<String>) + Send + 'static,
    {
        if writer.is_nil() {
            return Err(StorageError::InvalidContext);
        }
        let inner = Arc::clone(&self.inner);
        let confirmation = self
            .inner
            .queue
            .run("update_link_value", async move {
                inner.update_link_value(link, mutate, writer).await
            })
            .await??;
        confirmation.wait().await
    }

    /// Current value of `link`
    ///
    /// # Errors
    /// Store failures, or a stored value that is not UTF-8.
    pub async fn get_link_value(&self, link: &LinkPath) -> Result<Option<String>, StorageError> {
        let inner = Arc::clone(&self.inner);
        let key = keys::link_key(link);
        self.inner
            .queue
            .run("get_link_value", async move { inner.read_link_value(&key).await })
            .await?
    }

    /// Call `watcher` on every change of `link`
    ///
    /// [`LinkUpdate::origin`] names the writer when the change confirmed one
    /// of this instance's writes, so a writer can skip its own echoes.
    pub fn subscribe_link_value_updated<F>(&self, link: &LinkPath, watcher: F)
    where
        F: FnMut(&LinkUpdate) -> WatchAction + Send + 'static,
    {
        let key = keys::link_key(link);
        let mut state = self.inner.state.lock();
        state
            .links
            .entry(key)
            .or_insert_with(|| LinkWatchers {
                link: link.clone(),
                watchers: WatcherList::new(),
            })
            .watchers
            .add(watcher);
    }

    /// Store `data` as entity `cookie` of `entity_type`
    ///
    /// The type tag and the blob are committed in one batch.
    ///
    /// # Errors
    /// - `StorageError::InvalidCookie` for an empty cookie
    /// - `StorageError::InvalidType` for an empty type or one that differs
    ///   from the stored type
    /// - store or confirmation failures; a failed batch writes nothing
    pub async fn set_entity_data(
        &self,
        cookie: impl Into<String>,
        entity_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), StorageError> {
        let inner = Arc::clone(&self.inner);
        let cookie = cookie.into();
        let entity_type = entity_type.into();
        let confirmation = self
            .inner
            .queue
            .run("set_entity_data", async move {
                inner.set_entity_data(cookie, entity_type, data).await
            })
            .await??;
        confirmation.wait().await
    }

    /// Blob of entity `cookie`, which must have `entity_type`
    ///
    /// # Errors
    /// - `StorageError::InvalidCookie` for an empty or unknown cookie
    /// - `StorageError::InvalidType` for an empty or different type
    /// - `StorageError::Copy` when the type tag exists without a blob
    pub async fn get_entity_data(
        &self,
        cookie: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Result<Vec<u8>, StorageError> {
        let inner = Arc::clone(&self.inner);
        let cookie = cookie.into();
        let entity_type = entity_type.into();
        self.inner
            .queue
            .run("get_entity_data", async move {
                inner.get_entity_data(cookie, entity_type).await
            })
            .await?
    }

    /// Type tag of entity `cookie`
    ///
    /// # Errors
    /// `StorageError::InvalidCookie` for an empty or unknown cookie.
    pub async fn get_entity_type(&self, cookie: impl Into<String>) -> Result<String, StorageError> {
        let inner = Arc::clone(&self.inner);
        let cookie = cookie.into();
        self.inner
            .queue
            .run("get_entity_type", async move {
                if cookie.is_empty() {
                    return Err(StorageError::InvalidCookie(cookie));
                }
                let found = inner.read_entity_type(&cookie).await?;
                found.ok_or(StorageError::InvalidCookie(cookie))
            })
            .await?
    }

    /// Call `watcher` with a copy of the blob on every change of entity
    /// `cookie` whose type is `entity_type`
    pub fn watch_entity<F>(
        &self,
        cookie: impl Into<String>,
        entity_type: impl Into<String>,
        mut watcher: F,
    ) where
        F: FnMut(Vec<u8>) -> WatchAction + Send + 'static,
    {
        let entity_type = entity_type.into();
        let mut state = self.inner.state.lock();
        state
            .entities
            .entry(cookie.into())
            .or_default()
            .add(move |change: &EntityChange| {
                if change.entity_type == entity_type {
                    watcher(change.data.clone())
                } else {
                    WatchAction::Continue
                }
            });
    }

    /// Call `watcher` with every module record written by any writer
    pub fn subscribe_module_record_updated<F>(&self, watcher: F)
    where
        F: FnMut(&ModuleRecord) -> WatchAction + Send + 'static,
    {
        self.inner.module_watchers.add(watcher);
    }

    /// Writes still waiting for confirmation
    #[inline]
    #[must_use]
    pub fn pending_write_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Check if no operation is queued and no write is unconfirmed
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.queue.is_idle() && self.pending_write_count() == 0
    }

    /// Deferred completed the next time the storage queue is empty
    #[must_use]
    pub fn drained(&self) -> Deferred<()> {
        self.inner.queue.drained()
    }

    /// Label used in logs
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl fmt::Debug for StoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryStorage")
            .field("label", &self.inner.label)
            .field("queued", &self.inner.queue.len())
            .field("pending_writes", &self.pending_write_count())
            .finish()
    }
}

fn validate_entity_args(cookie: &str, entity_type: &str) -> Result<(), StorageError> {
    if cookie.is_empty() {
        return Err(StorageError::InvalidCookie(String::new()));
    }
    if entity_type.is_empty() {
        return Err(StorageError::InvalidType {
            cookie: cookie.to_string(),
            expected: String::new(),
            found: String::new(),
        });
    }
    Ok(())
}

fn ensure_module_path(path: &ModulePath) -> Result<(), StorageError> {
    if path.is_module_path() {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(format!("{:?}", path.segments())))
    }
}

/// Check if `record` is `tombstone` with only the deleted flag cleared
fn is_undelete_of(tombstone: &ModuleRecord, record: &ModuleRecord) -> bool {
    let mut restored = record.clone();
    restored.deleted = true;
    restored == *tombstone
}

fn utf8_value(key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
    String::from_utf8(bytes)
        .map_err(|e| crate::error::CodecError::Malformed(format!("{key}: {e}")).into())
}

impl Inner {
    async fn write_module_record(
        self: &Arc<Self>,
        record: ModuleRecord,
    ) -> Result<Confirmation, StorageError> {
        ensure_module_path(&record.path)?;
        let key = keys::module_key(&record.path);
        let bytes = codec::encode(&record)?;
        self.write_if_changed(key, Some(bytes), None).await
    }

    async fn update_module_record<F>(
        self: &Arc<Self>,
        path: ModulePath,
        mutate: F,
    ) -> Result<Confirmation, StorageError>
    where
        F: FnOnce(&mut Option<ModuleRecord>),
    {
        ensure_module_path(&path)?;
        let key = keys::module_key(&path);
        let mut next = self.read_module_record(&key).await?;
        let existed = next.is_some();
        let tombstone = next.clone().filter(|record| record.deleted);
        mutate(&mut next);

        match next {
            None if existed => Err(StorageError::InvalidMutation { key }),
            None => Ok(Confirmation::Unchanged),
            Some(record) if record.path != path => Err(StorageError::InvalidMutation { key }),
            Some(mut record) => {
                if let Some(tombstone) = tombstone {
                    if !record.deleted && !is_undelete_of(&tombstone, &record) {
                        tracing::debug!(storage = %self.label, module = %path, "mutation dropped the deleted flag, keeping it");
                        record.deleted = true;
                    }
                }
                let bytes = codec::encode(&record)?;
                self.write_if_changed(key, Some(bytes), None).await
            }
        }
    }

    async fn read_module_record(&self, key: &str) -> Result<Option<ModuleRecord>, StorageError> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn read_all_module_records(&self) -> Result<Vec<ModuleRecord>, StorageError> {
        let entries = self.store.get_prefix(keys::MODULE_KEY_PREFIX).await?;
        let mut records = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match codec::decode(&bytes) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(storage = %self.label, %key, error = %err, "skipping undecodable module record"),
            }
        }
        Ok(records)
    }

    async fn update_link_value<F>(
        self: &Arc<Self>,
        link: LinkPath,
        mutate: F,
        writer: WriterId,
    ) -> Result<Confirmation, StorageError>
    where
        F: FnOnce(&mut Option<String>),
    {
        let key = keys::link_key(&link);
        let current = self.read_link_value(&key).await?;
        let mut next = current.clone();
        mutate(&mut next);

        if next == current {
            tracing::debug!(storage = %self.label, %key, "link value unchanged, skipping write");
            return Ok(Confirmation::Unchanged);
        }
        let expected = next.map(String::into_bytes);
        let batch = match &expected {
            Some(bytes) => WriteBatch::new().put(key.clone(), bytes.clone()),
            None => WriteBatch::new().delete(key.clone()),
        };
        self.commit_tracked(batch, key, expected, Some(writer)).await
    }

    async fn read_link_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.store
            .get(key)
            .await?
            .map(|bytes| utf8_value(key, bytes))
            .transpose()
    }

    async fn set_entity_data(
        self: &Arc<Self>,
        cookie: String,
        entity_type: String,
        data: Vec<u8>,
    ) -> Result<Confirmation, StorageError> {
        validate_entity_args(&cookie, &entity_type)?;
        let type_key = keys::entity_type_key(&cookie);
        let data_key = keys::entity_data_key(&cookie);

        let stored_type = self.read_entity_type(&cookie).await?;
        if let Some(found) = &stored_type {
            if *found != entity_type {
                return Err(StorageError::InvalidType {
                    cookie,
                    expected: entity_type,
                    found: found.clone(),
                });
            }
        }
        let stored_data = self.store.get(&data_key).await?;

        let type_missing = stored_type.is_none();
        let data_changed = stored_data.as_deref() != Some(data.as_slice());
        if !type_missing && !data_changed {
            tracing::debug!(storage = %self.label, %cookie, "entity unchanged, skipping write");
            return Ok(Confirmation::Unchanged);
        }

        // Type before data, so dispatch knows the type when the blob arrives.
        let type_bytes = entity_type.into_bytes();
        let mut batch = WriteBatch::new();
        if type_missing {
            batch = batch.put(type_key.clone(), type_bytes.clone());
        }
        let (key, expected) = if data_changed {
            batch = batch.put(data_key.clone(), data.clone());
            (data_key, data)
        } else {
            (type_key, type_bytes)
        };
        self.commit_tracked(batch, key, Some(expected), None).await
    }

    async fn get_entity_data(
        &self,
        cookie: String,
        entity_type: String,
    ) -> Result<Vec<u8>, StorageError> {
        validate_entity_args(&cookie, &entity_type)?;
        let found = self.read_entity_type(&cookie).await?;
        let Some(found) = found else {
            return Err(StorageError::InvalidCookie(cookie));
        };
        if found != entity_type {
            return Err(StorageError::InvalidType {
                cookie,
                expected: entity_type,
                found,
            });
        }
        self.store
            .get(&keys::entity_data_key(&cookie))
            .await?
            .ok_or(StorageError::Copy { cookie })
    }

    async fn read_entity_type(&self, cookie: &str) -> Result<Option<String>, StorageError> {
        let key = keys::entity_type_key(cookie);
        self.store
            .get(&key)
            .await?
            .map(|bytes| utf8_value(&key, bytes))
            .transpose()
    }

    async fn write_if_changed(
        self: &Arc<Self>,
        key: String,
        value: Option<Vec<u8>>,
        writer: Option<WriterId>,
    ) -> Result<Confirmation, StorageError> {
        let current = self.store.get(&key).await?;
        if current == value {
            tracing::debug!(storage = %self.label, %key, "value unchanged, skipping write");
            return Ok(Confirmation::Unchanged);
        }
        let batch = match &value {
            Some(bytes) => WriteBatch::new().put(key.clone(), bytes.clone()),
            None => WriteBatch::new().delete(key.clone()),
        };
        self.commit_tracked(batch, key, value, writer).await
    }

    /// Commit `batch` and wait for `expected` to show up at `key`
    ///
    /// The pending entry is registered before the commit so a fast
    /// notification cannot be missed.
    async fn commit_tracked(
        self: &Arc<Self>,
        batch: WriteBatch,
        key: String,
        expected: Option<Vec<u8>>,
        writer: Option<WriterId>,
    ) -> Result<Confirmation, StorageError> {
        let done = WriteDone::new();
        let id = self
            .state
            .lock()
            .pending
            .register(key.clone(), expected, done.clone(), writer);

        if let Err(err) = self.store.commit(batch).await {
            self.state.lock().pending.remove(id);
            tracing::warn!(storage = %self.label, %key, error = %err, "store rejected write");
            return Err(err.into());
        }
        tracing::debug!(storage = %self.label, %key, "write issued, awaiting confirmation");
        Ok(Confirmation::Pending(self.bounded(key, id, done)))
    }

    fn bounded(self: &Arc<Self>, key: String, id: PendingId, done: WriteDone) -> WriteDone {
        let Some(timeout) = self.config.write_timeout() else {
            return done;
        };
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let owner = Arc::downgrade(self);

        with_timeout(&done, timeout).map(move |outcome| match outcome {
            Bounded::Completed(result) => result.clone(),
            Bounded::TimedOut => {
                // A confirmation racing the timer already removed the entry.
                let unconfirmed = owner
                    .upgrade()
                    .map_or(true, |inner| inner.state.lock().pending.remove(id));
                if unconfirmed {
                    tracing::warn!(%key, timeout_ms, "write not confirmed in time");
                    Err(StorageError::WriteTimeout { key, timeout_ms })
                } else {
                    Ok(())
                }
            }
        })
    }

    async fn dispatch(&self, change: StoreChange) {
        let resolved = self
            .state
            .lock()
            .pending
            .resolve(&change.key, change.value.as_deref());
        let origin = resolved.first().and_then(|entry| entry.writer);
        for entry in resolved {
            let _ = entry.done.complete(Ok(()));
        }

        match keys::classify(&change.key) {
            KeyKind::Module => self.dispatch_module(&change),
            KeyKind::EntityType(cookie) => {
                let mut state = self.state.lock();
                match change.value {
                    Some(bytes) => {
                        state
                            .entity_types
                            .insert(cookie, String::from_utf8_lossy(&bytes).into_owned());
                    }
                    None => {
                        state.entity_types.remove(&cookie);
                    }
                }
            }
            KeyKind::EntityData(cookie) => self.dispatch_entity(cookie, change.value).await,
            KeyKind::Link => self.dispatch_link(&change, origin),
            KeyKind::Unknown => {
                tracing::warn!(storage = %self.label, key = %change.key, "ignoring change in unknown namespace");
            }
        }
    }

    fn dispatch_module(&self, change: &StoreChange) {
        let Some(bytes) = &change.value else {
            tracing::debug!(storage = %self.label, key = %change.key, "module record removed");
            return;
        };
        match codec::decode(bytes) {
            Ok(record) => {
                self.module_watchers.notify(&record);
            }
            Err(err) => {
                tracing::warn!(storage = %self.label, key = %change.key, error = %err, "ignoring undecodable module record");
            }
        }
    }

    async fn dispatch_entity(&self, cookie: String, data: Option<Vec<u8>>) {
        let Some(data) = data else {
            return;
        };
        let watchers = self.state.lock().entities.get(&cookie).cloned();
        let Some(watchers) = watchers else {
            return;
        };

        let cached = self.state.lock().entity_types.get(&cookie).cloned();
        let entity_type = match cached {
            Some(entity_type) => entity_type,
            None => match self.read_entity_type(&cookie).await {
                Ok(Some(entity_type)) => {
                    self.state
                        .lock()
                        .entity_types
                        .insert(cookie.clone(), entity_type.clone());
                    entity_type
                }
                Ok(None) => {
                    tracing::debug!(storage = %self.label, %cookie, "entity blob without type tag");
                    return;
                }
                Err(err) => {
                    tracing::warn!(storage = %self.label, %cookie, error = %err, "entity type unreadable");
                    return;
                }
            },
        };

        watchers.notify(&EntityChange { entity_type, data });
        let mut state = self.state.lock();
        if state.entities.get(&cookie).is_some_and(WatcherList::is_empty) {
            state.entities.remove(&cookie);
        }
    }

    fn dispatch_link(&self, change: &StoreChange, origin: Option<WriterId>) {
        let entry = self
            .state
            .lock()
            .links
            .get(&change.key)
            .map(|entry| (entry.link.clone(), entry.watchers.clone()));
        let Some((link, watchers)) = entry else {
            return;
        };

        let value = match change.value.clone().map(|bytes| utf8_value(&change.key, bytes)).transpose() {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(storage = %self.label, key = %change.key, error = %err, "ignoring undecodable link value");
                return;
            }
        };

        watchers.notify(&LinkUpdate {
            link,
            value,
            origin,
        });
        let mut state = self.state.lock();
        if state
            .links
            .get(&change.key)
            .is_some_and(|entry| entry.watchers.is_empty())
        {
            state.links.remove(&change.key);
        }
    }
}

async fn watch_changes(
    inner: Weak<Inner>,
    mut changes: mpsc::UnboundedReceiver<StoreChange>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let change = tokio::select! {
            _ = &mut shutdown => break,
            change = changes.recv() => change,
        };
        let Some(change) = change else {
            break;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.dispatch(change).await;
    }
    tracing::debug!("storage watch task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Intent;
    use crate::store::MemoryStore;

    fn storage(store: &Arc<MemoryStore>) -> StoryStorage {
        StoryStorage::new("test", Arc::clone(store) as Arc<dyn Store>, StorageConfig::default())
    }

    fn record(name: &str) -> ModuleRecord {
        ModuleRecord::new(ModulePath::single(name), format!("app://{name}"), Intent::new("h1"))
    }

    #[tokio::test]
    async fn write_confirms_and_reads_back() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage(&store);

        storage.write_module_record(record("a")).await.unwrap();

        let read = storage.read_module_record(&ModulePath::single("a")).await.unwrap();
        assert_eq!(read, Some(record("a")));
        assert_eq!(storage.pending_write_count(), 0);
    }

    #[tokio::test]
    async fn unchanged_rewrite_skips_store() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage(&store);
        storage.write_module_record(record("a")).await.unwrap();

        // A muted store would never confirm a real write.
        store.set_notifications_muted(true);
        storage.write_module_record(record("a")).await.unwrap();
        assert_eq!(storage.pending_write_count(), 0);
    }

    #[tokio::test]
    async fn update_cannot_remove_existing_record() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage(&store);
        storage.write_module_record(record("a")).await.unwrap();

        let err = storage
            .update_module_record(ModulePath::single("a"), |current| *current = None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidMutation { .. }));
    }

    #[tokio::test]
    async fn nil_writer_rejected() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage(&store);
        let link = LinkPath::new(ModulePath::single("a"), "out");

        let err = storage
            .update_link_value(link, |v| *v = Some("1".into()), WriterId(uuid::Uuid::nil()))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::InvalidContext);
    }

    #[tokio::test]
    async fn entity_argument_validation() {
        let store = Arc::new(MemoryStore::new());
        let storage = storage(&store);

        assert!(matches!(
            storage.set_entity_data("", "t", vec![1]).await,
            Err(StorageError::InvalidCookie(_))
        ));
        assert!(matches!(
            storage.set_entity_data("c", "", vec![1]).await,
            Err(StorageError::InvalidType { .. })
        ));
        assert!(matches!(
            storage.get_entity_type("missing").await,
            Err(StorageError::InvalidCookie(_))
        ));
    }
}
