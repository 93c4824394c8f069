//! Error types for repository and cache operations.

use thiserror::Error;

use crate::EntryId;

/// Errors that can occur when talking to the entry repository.
///
/// Cloneable so a single coalesced fetch result can be handed to every
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The repository call failed.
    #[error("repository call failed: {0}")]
    Remote(String),

    /// The repository call did not finish in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Entry does not exist.
    #[error("entry not found: {0}")]
    NotFound(EntryId),

    /// The repository is not reachable at all.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Build a timeout error from the elapsed budget.
    pub fn timeout(operation: &'static str, after: std::time::Duration) -> Self {
        StoreError::Timeout {
            operation,
            after_ms: after.as_millis() as u64,
        }
    }
}
