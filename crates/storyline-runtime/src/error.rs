//! Error types for the story runtime

use storyline_async::DeferredError;
use storyline_storage::{ModulePath, StorageError};

/// Story runtime error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoryError {
    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Launcher could not start a module
    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Module path or name unusable
    #[error("invalid module path '{0}'")]
    InvalidPath(String),

    /// No such module or story
    #[error("not found: {0}")]
    NotFound(String),

    /// A newer launch, a delete or a stop replaced this launch
    #[error("launch of module '{0}' cancelled")]
    Cancelled(String),

    /// Operation needs a running story
    #[error("story is not running")]
    Stopped,

    /// The story queue dropped the request
    #[error("story request interrupted: {0}")]
    Interrupted(#[from] DeferredError),
}

impl StoryError {
    /// Missing module at `path`
    #[inline]
    #[must_use]
    pub fn module_not_found(path: &ModulePath) -> Self {
        Self::NotFound(format!("module '{path}'"))
    }
}

/// Errors reported by a [`Launcher`](crate::Launcher)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// No component is registered at the url
    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    /// Component found but failed to start
    #[error("component '{url}' failed to start: {reason}")]
    Failed {
        /// Component url
        url: String,
        /// Launcher-provided reason
        reason: String,
    },

    /// Launcher did not answer within the launch bound
    #[error("component '{url}' did not start within {timeout_ms}ms")]
    TimedOut {
        /// Component url
        url: String,
        /// Bound that elapsed
        timeout_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoryError::module_not_found(&ModulePath::from(&["a", "b"][..]));
        assert_eq!(err.to_string(), "not found: module 'a:b'");

        let err: StoryError = LaunchError::UnknownComponent("app://x".into()).into();
        assert!(err.to_string().contains("app://x"));
    }
}
