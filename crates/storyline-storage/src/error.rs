//! Error types for story storage
//!
//! Provides error handling for:
//! - Store transport failures
//! - Record encoding and decoding
//! - Entity type and cookie validation
//! - Unconfirmed writes

use storyline_async::DeferredError;

/// Main storage error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Store transport or store-side failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Stored payload could not be materialized
    #[error("entity payload unavailable for cookie '{cookie}'")]
    Copy {
        /// Entity cookie
        cookie: String,
    },

    /// Entity type empty or different from the stored type
    #[error("invalid entity type for cookie '{cookie}': expected '{expected}', found '{found}'")]
    InvalidType {
        /// Entity cookie
        cookie: String,
        /// Type the caller asked for
        expected: String,
        /// Type found in the store (empty if the caller passed an empty type)
        found: String,
    },

    /// Cookie empty or unknown
    #[error("invalid entity cookie '{0}'")]
    InvalidCookie(String),

    /// Writer context missing
    #[error("writer context must not be nil")]
    InvalidContext,

    /// Path has no segments or an empty segment
    #[error("invalid module path '{0}'")]
    InvalidPath(String),

    /// A mutate function removed an existing record
    #[error("mutation would remove existing value at '{key}'")]
    InvalidMutation {
        /// Store key
        key: String,
    },

    /// Record encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The store never confirmed a write
    #[error("write to '{key}' not confirmed after {timeout_ms}ms")]
    WriteTimeout {
        /// Store key
        key: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// The storage queue dropped the request
    #[error("storage request interrupted: {0}")]
    Interrupted(#[from] DeferredError),
}

impl StorageError {
    /// Check if the caller passed bad arguments (as opposed to a store failure)
    #[inline]
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidType { .. }
                | Self::InvalidCookie(_)
                | Self::InvalidPath(_)
                | Self::InvalidContext
                | Self::InvalidMutation { .. }
        )
    }
}

/// Errors reported by a [`Store`](crate::Store)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Write batch rejected; nothing was applied
    #[error("commit rejected: {0}")]
    CommitRejected(String),
}

/// Record codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes are not a record of the declared schema
    #[error("malformed record: {0}")]
    Malformed(String),

    /// No numeric `version` field
    #[error("record has no version field")]
    MissingVersion,

    /// Version not known to this build
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u64),
}
