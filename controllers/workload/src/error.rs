//! Controller-specific error types.
//!
//! This module defines error types specific to the Workload Controller
//! that are not covered by the store or data model errors.

use crds::{SelectorParseError, ValidationError};
use resource_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the Workload Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Resource store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Workload or Service spec is invalid; not retried until the spec changes
    #[error("Configuration error: {0}")]
    Configuration(#[from] ValidationError),

    /// Attempted to mutate a resource owned by someone else
    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),

    /// Transient store errors outlasted the retry budget
    #[error("Degraded after {attempts} attempts: {source}")]
    Degraded { attempts: u32, source: StoreError },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Manifest could not be parsed
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    /// Selector string could not be parsed
    #[error("Selector error: {0}")]
    Selector(#[from] SelectorParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Object loop or change feed failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe/metrics server failed
    #[error("Server error: {0}")]
    Server(String),
}

impl ControllerError {
    /// Whether requeueing (with backoff) can fix this error without a spec change.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Degraded { .. } => true,
            _ => false,
        }
    }
}
