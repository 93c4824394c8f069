//! Per-viewer interaction flags.
//!
//! A viewer's flags are cached as one envelope with a single `fetched_at`.
//! A request for a set of ids is served from the cache only when every id is
//! present and the envelope is still fresh; anything less is a miss for the
//! whole set.
//!
//! Each viewer also carries a logout generation, bumped by
//! [`ViewerStateCache::invalidate_viewer`]. Work that started before a logout
//! compares generations before writing, so it cannot bring the viewer back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::{publish, update_channel};
use crate::{
    BatchCoalescer, CacheConfig, CacheEnvelope, CacheUpdate, EntryId, EntryRepository,
    StoreError, ViewerFlag, ViewerId, ViewerInteractionState,
};

type ViewerStates = HashMap<EntryId, ViewerInteractionState>;

/// Thread-safe cache of [`ViewerInteractionState`] per viewer and entry.
pub struct ViewerStateCache {
    viewers: Arc<DashMap<ViewerId, CacheEnvelope<ViewerStates>>>,
    generations: Arc<DashMap<ViewerId, u64>>,
    coalescer: BatchCoalescer,
    ttl: Duration,
    updates_tx: broadcast::Sender<CacheUpdate>,
}

impl ViewerStateCache {
    /// Create an empty cache with its own update channel.
    pub fn new(repository: Arc<dyn EntryRepository>, config: &CacheConfig) -> Arc<Self> {
        Self::with_updates(repository, config, update_channel())
    }

    /// Create an empty cache publishing to an existing update channel.
    pub fn with_updates(
        repository: Arc<dyn EntryRepository>,
        config: &CacheConfig,
        updates_tx: broadcast::Sender<CacheUpdate>,
    ) -> Arc<Self> {
        Arc::new(Self {
            viewers: Arc::new(DashMap::new()),
            generations: Arc::new(DashMap::new()),
            coalescer: BatchCoalescer::new(repository, config),
            ttl: config.viewer_ttl,
            updates_tx,
        })
    }

    /// Subscribe to cache updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates_tx.subscribe()
    }

    /// The coalescer serving cache misses.
    pub fn coalescer(&self) -> &BatchCoalescer {
        &self.coalescer
    }

    /// The viewer's logout generation. Changes on every invalidation.
    pub fn generation(&self, viewer: &ViewerId) -> u64 {
        generation_of(&self.generations, viewer)
    }

    /// Cached flags for one entry. Absent means not yet known.
    pub fn get(&self, viewer: &ViewerId, id: &EntryId) -> Option<ViewerInteractionState> {
        self.viewers
            .get(viewer)
            .and_then(|r| r.value().value.get(id).copied())
    }

    /// Flags for every id in `ids`, if all are cached and the viewer's
    /// envelope is fresh.
    pub fn lookup(&self, viewer: &ViewerId, ids: &[EntryId]) -> Option<ViewerStates> {
        let envelope = self.viewers.get(viewer)?;
        if !envelope.is_fresh(self.ttl) {
            return None;
        }
        ids.iter()
            .map(|id| envelope.value.get(id).map(|state| (id.clone(), *state)))
            .collect()
    }

    /// Whether the viewer's envelope exists and is within the TTL.
    pub fn is_valid(&self, viewer: &ViewerId) -> bool {
        self.viewers
            .get(viewer)
            .is_some_and(|r| r.value().is_fresh(self.ttl))
    }

    /// Flags for `ids`, served from the cache on a complete fresh hit and
    /// otherwise fetched through the coalescer and merged in.
    #[tracing::instrument(skip(self, viewer, ids), fields(viewer = %viewer, count = ids.len()))]
    pub async fn batch_load(
        &self,
        viewer: &ViewerId,
        ids: &[EntryId],
    ) -> Result<ViewerStates, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        if let Some(hit) = self.lookup(viewer, ids) {
            trace!("viewer states served from cache");
            return Ok(hit);
        }

        let viewers = Arc::clone(&self.viewers);
        let generations = Arc::clone(&self.generations);
        let started = self.generation(viewer);
        let updates_tx = self.updates_tx.clone();
        let loaded = self
            .coalescer
            .load_with(viewer, ids, move |viewer, states| {
                if generation_of(&generations, viewer) != started {
                    debug!(viewer = %viewer, "viewer invalidated during load, not merging");
                    return;
                }
                merge(&viewers, viewer, states);
                publish(
                    &updates_tx,
                    CacheUpdate::ViewerStatesLoaded {
                        viewer: viewer.clone(),
                        ids: states.keys().cloned().collect(),
                    },
                );
            })
            .await?;

        Ok(ids
            .iter()
            .filter_map(|id| loaded.get(id).map(|state| (id.clone(), *state)))
            .collect())
    }

    /// Set one flag in place, starting from `{false, false}` if nothing is
    /// cached for the entry yet. Returns the new state.
    pub fn set_flag(
        &self,
        viewer: &ViewerId,
        id: &EntryId,
        flag: ViewerFlag,
        value: bool,
    ) -> ViewerInteractionState {
        let state = {
            let mut envelope = self
                .viewers
                .entry(viewer.clone())
                .or_insert_with(|| CacheEnvelope::new(HashMap::new(), Instant::now()));
            let state = envelope.value.entry(id.clone()).or_default();
            state.set(flag, value);
            *state
        };

        trace!(viewer = %viewer, entry = %id, ?flag, value, "cache: flag set");
        publish(
            &self.updates_tx,
            CacheUpdate::ViewerStateChanged {
                viewer: viewer.clone(),
                id: id.clone(),
                state: Some(state),
            },
        );
        state
    }

    /// Put an entry's flags back to a snapshot taken earlier.
    ///
    /// A `None` snapshot removes the entry so it reads as unknown again.
    /// Nothing is written if the viewer has no envelope.
    pub fn restore(&self, viewer: &ViewerId, id: &EntryId, snapshot: Option<ViewerInteractionState>) {
        let Some(mut envelope) = self.viewers.get_mut(viewer) else {
            trace!(viewer = %viewer, entry = %id, "cache: nothing to restore");
            return;
        };
        match snapshot {
            Some(state) => {
                envelope.value.insert(id.clone(), state);
            }
            None => {
                envelope.value.remove(id);
            }
        }
        drop(envelope);

        trace!(viewer = %viewer, entry = %id, ?snapshot, "cache: flags restored");
        publish(
            &self.updates_tx,
            CacheUpdate::ViewerStateChanged {
                viewer: viewer.clone(),
                id: id.clone(),
                state: snapshot,
            },
        );
    }

    /// Drop everything cached for a viewer (logout).
    pub fn invalidate_viewer(&self, viewer: &ViewerId) {
        *self.generations.entry(viewer.clone()).or_default() += 1;
        if self.viewers.remove(viewer).is_some() {
            debug!(viewer = %viewer, "viewer states invalidated");
            publish(
                &self.updates_tx,
                CacheUpdate::ViewerInvalidated {
                    viewer: viewer.clone(),
                },
            );
        }
    }

    /// Drop every viewer whose envelope is older than the TTL. Returns how
    /// many viewers were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.viewers.len();
        self.viewers.retain(|_, envelope| envelope.is_fresh(self.ttl));
        let purged = before.saturating_sub(self.viewers.len());
        if purged > 0 {
            debug!(purged, "expired viewer states purged");
        }
        purged
    }

    /// Number of viewers with cached state.
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

fn generation_of(generations: &DashMap<ViewerId, u64>, viewer: &ViewerId) -> u64 {
    generations.get(viewer).map_or(0, |r| *r.value())
}

/// Merge freshly fetched states into a viewer's envelope and restamp it.
fn merge(
    viewers: &DashMap<ViewerId, CacheEnvelope<ViewerStates>>,
    viewer: &ViewerId,
    states: &ViewerStates,
) {
    let now = Instant::now();
    let mut envelope = viewers
        .entry(viewer.clone())
        .or_insert_with(|| CacheEnvelope::new(HashMap::new(), now));
    envelope
        .value
        .extend(states.iter().map(|(id, state)| (id.clone(), *state)));
    envelope.fetched_at = now;
}
