//! Link addressing and writer identity

use crate::path::ModulePath;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Address of a named link owned by a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkPath {
    /// Module owning the link
    pub module_path: ModulePath,
    /// Link name within the module
    pub link_name: String,
}

impl LinkPath {
    /// Create link path
    #[inline]
    #[must_use]
    pub fn new(module_path: ModulePath, link_name: impl Into<String>) -> Self {
        Self {
            module_path,
            link_name: link_name.into(),
        }
    }
}

impl fmt::Display for LinkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module_path, self.link_name)
    }
}

/// Identity attached to link writes
///
/// Subscribers compare the origin of an update with their own id to skip
/// echoes of their own writes. The nil id is rejected by storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriterId(pub Uuid);

impl WriterId {
    /// Generate a fresh writer id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Check if this is the nil id
    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for WriterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Link change delivered to link subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkUpdate {
    /// Link that changed
    pub link: LinkPath,
    /// New value, `None` when the link was removed
    pub value: Option<String>,
    /// Writer of a locally confirmed write; `None` for peer writes
    pub origin: Option<WriterId>,
}

impl LinkUpdate {
    /// Check if `writer` produced this update
    #[inline]
    #[must_use]
    pub fn is_from(&self, writer: WriterId) -> bool {
        self.origin == Some(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_ids_are_unique_and_not_nil() {
        let a = WriterId::new();
        let b = WriterId::new();
        assert_ne!(a, b);
        assert!(!a.is_nil());
        assert!(WriterId(Uuid::nil()).is_nil());
    }

    #[test]
    fn update_origin_matching() {
        let writer = WriterId::new();
        let update = LinkUpdate {
            link: LinkPath::new(ModulePath::single("m"), "out"),
            value: Some("1".to_string()),
            origin: Some(writer),
        };
        assert!(update.is_from(writer));
        assert!(!update.is_from(WriterId::new()));
        assert_eq!(update.link.to_string(), "m/out");
    }
}
