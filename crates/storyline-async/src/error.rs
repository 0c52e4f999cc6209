//! Error types for deferred values

/// Errors from completing or awaiting a [`Deferred`](crate::Deferred)
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeferredError {
    /// A value was already set
    #[error("deferred already completed")]
    AlreadyCompleted,

    /// Every handle was dropped before a value was set
    #[error("deferred abandoned before completion")]
    Abandoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_error_display() {
        assert!(DeferredError::AlreadyCompleted
            .to_string()
            .contains("already completed"));
        assert!(DeferredError::Abandoned.to_string().contains("abandoned"));
    }
}
