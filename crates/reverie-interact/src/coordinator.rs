//! Optimistic interaction coordination.
//!
//! A toggle moves through Idle, Pending and back to Idle:
//!
//! 1. Claim the (viewer, entry, kind) slot, rejecting the call if it is
//!    already claimed.
//! 2. Snapshot the flag and counter, then flip the flag and apply a ±1
//!    delta locally.
//! 3. Call the repository under a deadline.
//! 4. On success, adopt the repository's answer if it disagrees with the
//!    guess. On failure or timeout, restore the snapshot exactly.
//!
//! The slot is released when the call settles, whichever way it settles.
//! If the viewer logged out while the call was pending, the settle step
//! leaves their flags alone.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reverie_store::{
    CacheConfig, CountCache, CountField, Entry, EntryFilter, EntryId, EntryRepository,
    InteractionCounts, ViewerFlag, ViewerId, ViewerStateCache, update_channel, with_timeout,
};
use reverie_thread::{ThreadBuilder, ThreadNode};

use crate::pending::PendingSet;
use crate::{InteractionConfig, InteractionError, RenderedEntry};

/// The toggleable interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Resonance,
    Amplification,
}

impl InteractionKind {
    pub fn flag(self) -> ViewerFlag {
        match self {
            InteractionKind::Resonance => ViewerFlag::HasResonated,
            InteractionKind::Amplification => ViewerFlag::HasAmplified,
        }
    }

    pub fn count_field(self) -> CountField {
        match self {
            InteractionKind::Resonance => CountField::Resonance,
            InteractionKind::Amplification => CountField::Amplification,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            InteractionKind::Resonance => "toggle_resonance",
            InteractionKind::Amplification => "toggle_amplification",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::Resonance => write!(f, "resonance"),
            InteractionKind::Amplification => write!(f, "amplification"),
        }
    }
}

/// Result of a settled toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionOutcome {
    /// Whether the interaction is now set, per the repository.
    pub active: bool,
    /// Counters after the toggle, if the entry is cached.
    pub counts: Option<InteractionCounts>,
    /// The repository disagreed with the optimistic guess.
    pub reconciled: bool,
}

/// Coordinates optimistic updates against the interaction caches.
pub struct InteractionCoordinator {
    repository: Arc<dyn EntryRepository>,
    counts: Arc<CountCache>,
    viewers: Arc<ViewerStateCache>,
    builder: ThreadBuilder,
    config: InteractionConfig,
    pending: PendingSet,
}

impl InteractionCoordinator {
    pub fn new(
        repository: Arc<dyn EntryRepository>,
        counts: Arc<CountCache>,
        viewers: Arc<ViewerStateCache>,
        config: InteractionConfig,
    ) -> Self {
        Self {
            repository,
            counts,
            viewers,
            builder: ThreadBuilder::default(),
            config,
            pending: PendingSet::default(),
        }
    }

    /// Wire up both caches over `repository`, sharing one update channel.
    pub fn from_repository(
        repository: Arc<dyn EntryRepository>,
        cache_config: &CacheConfig,
        config: InteractionConfig,
    ) -> Self {
        let updates = update_channel();
        let counts = CountCache::with_updates(repository.clone(), cache_config, updates.clone());
        let viewers = ViewerStateCache::with_updates(repository.clone(), cache_config, updates);
        Self::new(repository, counts, viewers, config)
    }

    /// Use `builder` for [`Self::load_thread`].
    pub fn with_builder(mut self, builder: ThreadBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn counts(&self) -> &Arc<CountCache> {
        &self.counts
    }

    pub fn viewers(&self) -> &Arc<ViewerStateCache> {
        &self.viewers
    }

    pub fn builder(&self) -> &ThreadBuilder {
        &self.builder
    }

    /// Whether a toggle for this key is awaiting the repository.
    pub fn is_pending(&self, viewer: &ViewerId, entry: &EntryId, kind: InteractionKind) -> bool {
        self.pending
            .contains(&(viewer.clone(), entry.clone(), kind))
    }

    /// Number of toggles awaiting the repository.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Toggle the viewer's resonance with an entry.
    #[tracing::instrument(skip(self, viewer, entry), fields(viewer = %viewer, entry = %entry))]
    pub async fn resonate(
        &self,
        viewer: &ViewerId,
        entry: &EntryId,
    ) -> Result<InteractionOutcome, InteractionError> {
        self.toggle(viewer, entry, InteractionKind::Resonance).await
    }

    /// Toggle the viewer's amplification of an entry.
    #[tracing::instrument(skip(self, viewer, entry), fields(viewer = %viewer, entry = %entry))]
    pub async fn amplify(
        &self,
        viewer: &ViewerId,
        entry: &EntryId,
    ) -> Result<InteractionOutcome, InteractionError> {
        self.toggle(viewer, entry, InteractionKind::Amplification).await
    }

    async fn toggle(
        &self,
        viewer: &ViewerId,
        entry: &EntryId,
        kind: InteractionKind,
    ) -> Result<InteractionOutcome, InteractionError> {
        let Some(_guard) = self
            .pending
            .acquire((viewer.clone(), entry.clone(), kind))
        else {
            debug!(%kind, "already pending, ignoring");
            return Err(InteractionError::AlreadyPending {
                viewer: viewer.clone(),
                entry: entry.clone(),
                kind,
            });
        };

        let flag = kind.flag();
        let field = kind.count_field();

        // Snapshot before touching anything
        let generation = self.viewers.generation(viewer);
        let prior_state = self.viewers.get(viewer, entry);
        let prior_count = self.counts.get(entry).map(|c| c.get(field));

        let guess = !prior_state.is_some_and(|s| s.get(flag));
        self.viewers.set_flag(viewer, entry, flag, guess);
        self.counts.apply_delta(entry, field, delta(guess));
        debug!(%kind, guess, "optimistic update applied");

        let remote = match kind {
            InteractionKind::Resonance => self.repository.toggle_resonance(viewer, entry),
            InteractionKind::Amplification => self.repository.toggle_amplification(viewer, entry),
        };
        let result = with_timeout(kind.operation(), self.config.toggle_timeout, remote).await;

        let logged_out = self.viewers.generation(viewer) != generation;
        if logged_out {
            debug!(%kind, "viewer invalidated while pending, flags left unset");
        }

        match result {
            Ok(active) => {
                let reconciled = active != guess;
                if reconciled {
                    debug!(%kind, guess, active, "repository disagreed, reconciling");
                    if !logged_out {
                        self.viewers.set_flag(viewer, entry, flag, active);
                    }
                    if let Some(prior) = prior_count {
                        self.counts.restore_field(entry, field, prior);
                        self.counts.apply_delta(entry, field, delta(active));
                    }
                }

                Ok(InteractionOutcome {
                    active,
                    counts: self.counts.get(entry),
                    reconciled,
                })
            }
            Err(err) => {
                warn!(%kind, error = %err, "interaction failed, rolling back");
                if !logged_out {
                    self.viewers.restore(viewer, entry, prior_state);
                }
                if let Some(prior) = prior_count {
                    self.counts.restore_field(entry, field, prior);
                }
                Err(err.into())
            }
        }
    }

    /// Create a reply to `parent`.
    ///
    /// The parent's branch counter is bumped only once the repository has
    /// accepted the branch. The new entry is returned, not spliced into any
    /// tree; rebuild the thread to show it.
    #[tracing::instrument(skip(self, parent, content), fields(parent = %parent))]
    pub async fn branch(
        &self,
        parent: &EntryId,
        content: impl Into<String>,
    ) -> Result<Entry, InteractionError> {
        let content = content.into();

        let result = with_timeout(
            "create_branch",
            self.config.branch_timeout,
            self.repository.create_branch(parent, &content),
        )
        .await;

        match result {
            Ok(entry) => {
                self.counts.apply_delta(parent, CountField::Branch, 1);
                info!(branch = %entry.id, "branch created");
                Ok(entry)
            }
            Err(source) => {
                warn!(error = %source, "branch creation failed");
                Err(InteractionError::BranchFailed {
                    parent: parent.clone(),
                    content,
                    source,
                })
            }
        }
    }

    /// Merge thread nodes with whatever the caches currently hold.
    ///
    /// Never fetches. Counters fall back to the entry's own; unknown flags
    /// stay `None`.
    pub fn hydrate(&self, viewer: &ViewerId, nodes: Vec<ThreadNode>) -> Vec<RenderedEntry> {
        nodes
            .into_iter()
            .map(|node| {
                let id = &node.entry.id;
                let counts = self.counts.get(id).unwrap_or(node.entry.counts);
                let viewer_state = self.viewers.get(viewer, id);
                RenderedEntry {
                    node,
                    counts,
                    viewer_state,
                }
            })
            .collect()
    }

    /// Fetch, build, warm both caches and hydrate a thread.
    ///
    /// Only the entry fetch is fatal. If the caches cannot be warmed the
    /// records are hydrated from what is already known.
    #[tracing::instrument(skip(self, viewer, filter), fields(viewer = %viewer))]
    pub async fn load_thread(
        &self,
        viewer: &ViewerId,
        filter: &EntryFilter,
    ) -> Result<Vec<RenderedEntry>, InteractionError> {
        let entries = with_timeout(
            "get_entries",
            self.config.load_timeout,
            self.repository.get_entries(filter),
        )
        .await?;

        let nodes = self.builder.build(&entries, None);
        let ids: Vec<EntryId> = nodes.iter().map(|n| n.entry.id.clone()).collect();

        if let Err(err) = self.counts.refresh(&ids).await {
            warn!(error = %err, "count refresh failed, using embedded counts");
        }
        if let Err(err) = self.viewers.batch_load(viewer, &ids).await {
            warn!(error = %err, "viewer state load failed, flags unknown");
        }

        Ok(self.hydrate(viewer, nodes))
    }
}

fn delta(active: bool) -> i64 {
    if active { 1 } else { -1 }
}
