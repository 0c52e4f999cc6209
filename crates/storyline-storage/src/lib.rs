//! Storyline storage
//!
//! Persists a story's module records, link values and typed entity blobs
//! on a replicated key-value [`Store`]:
//! - [`StoryStorage`]: serialized reads and confirmed writes
//! - [`ModuleRecord`] and friends: the persisted data model
//! - [`codec`]: version-tagged JSON encoding of records
//! - [`keys`]: escaped key layout of every namespace
//! - [`MemoryStore`]: in-process store for hosts and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storyline_storage::{Intent, MemoryStore, ModulePath, ModuleRecord, StorageConfig, StoryStorage};
//!
//! let storage = StoryStorage::new("story", Arc::new(MemoryStore::new()), StorageConfig::default());
//! let record = ModuleRecord::new(ModulePath::single("map"), "app://map", Intent::new("maps"));
//! storage.write_module_record(record).await?; // resolved once the store reports the write
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod codec;
mod config;
mod error;
pub mod keys;
mod link;
mod path;
mod pending;
mod record;
mod storage;
mod store;

pub use codec::RecordVersion;
pub use config::{StorageConfig, DEFAULT_WRITE_TIMEOUT_MS};
pub use error::{CodecError, StorageError, StoreError};
pub use link::{LinkPath, LinkUpdate, WriterId};
pub use path::ModulePath;
pub use record::{
    Intent, IntentParameter, ModuleRecord, ModuleSource, ParameterMapping, SurfaceArrangement,
    SurfaceDependency, SurfaceRelation,
};
pub use storage::StoryStorage;
pub use store::{BatchOp, MemoryStore, Store, StoreChange, WriteBatch};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
