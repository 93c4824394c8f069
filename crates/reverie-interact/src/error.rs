//! Error types for interaction coordination.

use thiserror::Error;

use reverie_store::{EntryId, StoreError, ViewerId};

use crate::InteractionKind;

/// Errors returned by [`crate::InteractionCoordinator`].
///
/// Apart from `AlreadyPending`, every variant is returned only after the
/// caches have been put back to their pre-action state.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The same action is already in flight. Nothing was changed.
    #[error("{kind} already pending for viewer {viewer} on entry {entry}")]
    AlreadyPending {
        viewer: ViewerId,
        entry: EntryId,
        kind: InteractionKind,
    },

    /// The repository rejected the call.
    #[error("remote call failed: {0}")]
    Remote(#[source] StoreError),

    /// The repository did not answer in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Creating a branch failed. The draft is handed back for resubmission.
    #[error("failed to branch from {parent}")]
    BranchFailed {
        parent: EntryId,
        content: String,
        #[source]
        source: StoreError,
    },
}

impl InteractionError {
    /// Whether this is the no-op rejection of a duplicate action.
    pub fn is_already_pending(&self) -> bool {
        matches!(self, InteractionError::AlreadyPending { .. })
    }
}

impl From<StoreError> for InteractionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout {
                operation,
                after_ms,
            } => InteractionError::Timeout {
                operation,
                after_ms,
            },
            other => InteractionError::Remote(other),
        }
    }
}
