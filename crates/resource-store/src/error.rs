//! Resource store errors

use crds::ValidationError;
use thiserror::Error;

/// Errors that can occur when reading from or writing to the resource store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object with the same key already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency check failed: the object changed since it was read
    #[error("Conflict on {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A commit-time precondition other than the version (e.g. owner) did not hold
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Store asked the caller to slow down
    #[error("Throttled: {0}")]
    Throttled(String),

    /// No response; the operation may or may not have been applied
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Rejected at admission (not retryable)
    #[error("Rejected: {0}")]
    Rejected(#[from] ValidationError),
}

impl StoreError {
    /// Errors that go away by themselves: retry the operation or the whole reconcile step.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::PreconditionFailed(_) | Self::Throttled(_) | Self::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let conflict = StoreError::Conflict {
            key: "default/web-1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_transient());

        assert!(StoreError::Timeout("create".to_string()).is_transient());
        assert!(StoreError::Throttled("create".to_string()).is_transient());

        assert!(!StoreError::NotFound("x".to_string()).is_transient());
        assert!(!StoreError::Rejected(ValidationError::MissingName("Workload")).is_transient());
    }
}
