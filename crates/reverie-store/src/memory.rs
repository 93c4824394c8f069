//! In-memory repository.
//!
//! Backs the CLI simulator and tests. Supports artificial latency and
//! failure injection, and counts calls per method so coalescing can be
//! observed from the outside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::trace;

use crate::{
    CountField, Entry, EntryFilter, EntryId, EntryRepository, InteractionCounts, StoreError,
    ViewerFlag, ViewerId, ViewerInteractionState,
};

/// Snapshot of how many times each repository method was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_entries: usize,
    pub get_entries_by_ids: usize,
    pub get_counts: usize,
    pub get_viewer_states: usize,
    pub toggle_resonance: usize,
    pub toggle_amplification: usize,
    pub create_branch: usize,
}

#[derive(Default)]
struct CallCounters {
    get_entries: AtomicUsize,
    get_entries_by_ids: AtomicUsize,
    get_counts: AtomicUsize,
    get_viewer_states: AtomicUsize,
    toggle_resonance: AtomicUsize,
    toggle_amplification: AtomicUsize,
    create_branch: AtomicUsize,
}

/// Repository that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryRepository {
    entries: DashMap<EntryId, Entry>,
    viewer_states: DashMap<(ViewerId, EntryId), ViewerInteractionState>,
    latency_ms: AtomicU64,
    failing: AtomicBool,
    next_branch: AtomicU64,
    calls: CallCounters,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository seeded with entries. Later duplicates win.
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let repo = Self::new();
        for entry in entries {
            repo.insert(entry);
        }
        repo
    }

    /// Add artificial latency to every call.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every subsequent call fail with [`StoreError::Remote`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Insert or replace an entry.
    pub fn insert(&self, entry: Entry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Remove an entry, as if it was deleted upstream.
    pub fn remove(&self, id: &EntryId) -> Option<Entry> {
        self.entries.remove(id).map(|(_, entry)| entry)
    }

    /// Seed a viewer's flags directly.
    pub fn set_viewer_state(&self, viewer: &ViewerId, id: &EntryId, state: ViewerInteractionState) {
        self.viewer_states
            .insert((viewer.clone(), id.clone()), state);
    }

    /// Read an entry without going through the async interface.
    pub fn entry(&self, id: &EntryId) -> Option<Entry> {
        self.entries.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-method call counts so far.
    pub fn calls(&self) -> CallCounts {
        let c = &self.calls;
        CallCounts {
            get_entries: c.get_entries.load(Ordering::SeqCst),
            get_entries_by_ids: c.get_entries_by_ids.load(Ordering::SeqCst),
            get_counts: c.get_counts.load(Ordering::SeqCst),
            get_viewer_states: c.get_viewer_states.load(Ordering::SeqCst),
            toggle_resonance: c.toggle_resonance.load(Ordering::SeqCst),
            toggle_amplification: c.toggle_amplification.load(Ordering::SeqCst),
            create_branch: c.create_branch.load(Ordering::SeqCst),
        }
    }

    /// Simulate the network: wait, then fail if failure injection is on.
    async fn round_trip(&self, counter: &AtomicUsize, method: &'static str) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::SeqCst);
        trace!(method, "memory repository call");

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Remote(format!("{} failed (injected)", method)));
        }
        Ok(())
    }

    fn toggle(&self, viewer: &ViewerId, id: &EntryId, flag: ViewerFlag) -> Result<bool, StoreError> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let mut state = self
            .viewer_states
            .entry((viewer.clone(), id.clone()))
            .or_default();
        let now_set = !state.get(flag);
        state.set(flag, now_set);

        let field = match flag {
            ViewerFlag::HasResonated => CountField::Resonance,
            ViewerFlag::HasAmplified => CountField::Amplification,
        };
        entry.counts.apply(field, if now_set { 1 } else { -1 });

        Ok(now_set)
    }
}

#[async_trait]
impl EntryRepository for MemoryRepository {
    async fn get_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>, StoreError> {
        self.round_trip(&self.calls.get_entries, "get_entries").await?;

        let mut entries: Vec<Entry> = self
            .entries
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn get_entries_by_ids(&self, ids: &[EntryId]) -> Result<Vec<Entry>, StoreError> {
        self.round_trip(&self.calls.get_entries_by_ids, "get_entries_by_ids")
            .await?;

        Ok(ids
            .iter()
            .filter_map(|id| self.entries.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn get_counts(
        &self,
        ids: &[EntryId],
    ) -> Result<HashMap<EntryId, InteractionCounts>, StoreError> {
        self.round_trip(&self.calls.get_counts, "get_counts").await?;

        Ok(ids
            .iter()
            .filter_map(|id| self.entries.get(id).map(|r| (id.clone(), r.value().counts)))
            .collect())
    }

    async fn get_viewer_states(
        &self,
        viewer: &ViewerId,
        ids: &[EntryId],
    ) -> Result<HashMap<EntryId, ViewerInteractionState>, StoreError> {
        self.round_trip(&self.calls.get_viewer_states, "get_viewer_states")
            .await?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                self.viewer_states
                    .get(&(viewer.clone(), id.clone()))
                    .map(|r| (id.clone(), *r.value()))
            })
            .collect())
    }

    async fn toggle_resonance(&self, viewer: &ViewerId, id: &EntryId) -> Result<bool, StoreError> {
        self.round_trip(&self.calls.toggle_resonance, "toggle_resonance")
            .await?;
        self.toggle(viewer, id, ViewerFlag::HasResonated)
    }

    async fn toggle_amplification(
        &self,
        viewer: &ViewerId,
        id: &EntryId,
    ) -> Result<bool, StoreError> {
        self.round_trip(&self.calls.toggle_amplification, "toggle_amplification")
            .await?;
        self.toggle(viewer, id, ViewerFlag::HasAmplified)
    }

    async fn create_branch(&self, parent_id: &EntryId, content: &str) -> Result<Entry, StoreError> {
        self.round_trip(&self.calls.create_branch, "create_branch")
            .await?;

        let mut parent = self
            .entries
            .get_mut(parent_id)
            .ok_or_else(|| StoreError::NotFound(parent_id.clone()))?;
        parent.counts.apply(CountField::Branch, 1);
        let kind = parent.kind;
        drop(parent);

        let n = self.next_branch.fetch_add(1, Ordering::SeqCst);
        let entry = Entry::new(format!("branch-{}", n), Some(parent_id.clone()), Utc::now())
            .with_kind(kind)
            .with_content(content);
        self.insert(entry.clone());
        Ok(entry)
    }
}
