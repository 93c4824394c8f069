//! The seam to the backend that owns entries and interactions.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    Entry, EntryFilter, EntryId, InteractionCounts, StoreError, ViewerId, ViewerInteractionState,
};

/// Authoritative source of entries, counters and per-viewer flags.
///
/// Implementations own the persistence and transport; everything in this
/// workspace treats them as a black box.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// List entries matching a filter.
    async fn get_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>, StoreError>;

    /// Fetch entries by id. Unknown ids are skipped.
    async fn get_entries_by_ids(&self, ids: &[EntryId]) -> Result<Vec<Entry>, StoreError>;

    /// Fetch aggregate counters. Unknown ids are absent from the map.
    async fn get_counts(
        &self,
        ids: &[EntryId],
    ) -> Result<HashMap<EntryId, InteractionCounts>, StoreError>;

    /// Fetch a viewer's flags. Ids the viewer never touched may be absent.
    async fn get_viewer_states(
        &self,
        viewer: &ViewerId,
        ids: &[EntryId],
    ) -> Result<HashMap<EntryId, ViewerInteractionState>, StoreError>;

    /// Toggle a resonance and return whether it is now set.
    async fn toggle_resonance(&self, viewer: &ViewerId, id: &EntryId) -> Result<bool, StoreError>;

    /// Toggle an amplification and return whether it is now set.
    async fn toggle_amplification(
        &self,
        viewer: &ViewerId,
        id: &EntryId,
    ) -> Result<bool, StoreError>;

    /// Create a reply to `parent_id`.
    async fn create_branch(&self, parent_id: &EntryId, content: &str) -> Result<Entry, StoreError>;
}

/// Run a repository call under a deadline.
///
/// Elapsed deadlines surface as [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::timeout(operation, after)),
    }
}
