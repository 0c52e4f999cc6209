//! Storage settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on a write confirmation
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 30_000;

/// Story storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Milliseconds to wait for a write confirmation; `None` waits forever
    pub write_timeout_ms: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: Some(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

impl StorageConfig {
    /// With confirmation bound (`None` disables it)
    #[inline]
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout_ms = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Confirmation bound
    #[inline]
    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}
