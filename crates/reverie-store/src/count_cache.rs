//! Aggregate interaction counters per entry.
//!
//! Counters are overwritten only by [`CountCache::refresh`]. Optimistic
//! updates go through [`CountCache::apply_delta`], which never drives a
//! counter below zero and never invents an entry that was not fetched.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::{publish, update_channel};
use crate::repository::with_timeout;
use crate::{
    CacheConfig, CacheEnvelope, CacheUpdate, CountField, EntryId, EntryRepository,
    InteractionCounts, StoreError,
};

/// Thread-safe cache of [`InteractionCounts`] keyed by entry id.
pub struct CountCache {
    entries: DashMap<EntryId, CacheEnvelope<InteractionCounts>>,
    repository: Arc<dyn EntryRepository>,
    ttl: Duration,
    refresh_timeout: Duration,
    updates_tx: broadcast::Sender<CacheUpdate>,
}

impl CountCache {
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
            entries: DashMap::new(),
            repository,
            ttl: config.count_ttl,
            refresh_timeout: config.refresh_timeout,
            updates_tx,
        })
    }

    /// Subscribe to cache updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates_tx.subscribe()
    }

    /// Cached counters, fresh or not.
    pub fn get(&self, id: &EntryId) -> Option<InteractionCounts> {
        self.entries.get(id).map(|r| r.value().value)
    }

    /// Cached counters, only if still within the TTL.
    pub fn get_fresh(&self, id: &EntryId) -> Option<InteractionCounts> {
        self.entries
            .get(id)
            .filter(|r| r.value().is_fresh(self.ttl))
            .map(|r| r.value().value)
    }

    /// Whether an entry is cached and younger than the TTL.
    pub fn is_valid(&self, id: &EntryId) -> bool {
        self.entries
            .get(id)
            .is_some_and(|r| r.value().is_fresh(self.ttl))
    }

    /// Overwrite the counters for exactly `ids` from the repository.
    ///
    /// Ids the repository no longer knows are dropped from the cache.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn refresh(&self, ids: &[EntryId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let fetched = with_timeout(
            "get_counts",
            self.refresh_timeout,
            self.repository.get_counts(ids),
        )
        .await?;

        let now = Instant::now();
        let mut refreshed = Vec::with_capacity(fetched.len());
        for id in ids {
            match fetched.get(id) {
                Some(counts) => {
                    self.entries
                        .insert(id.clone(), CacheEnvelope::new(*counts, now));
                    refreshed.push(id.clone());
                }
                None => {
                    if self.entries.remove(id).is_some() {
                        debug!(entry = %id, "entry missing from refresh, dropped");
                    }
                }
            }
        }

        debug!(refreshed = refreshed.len(), "counts refreshed");
        publish(&self.updates_tx, CacheUpdate::CountsRefreshed { ids: refreshed });
        Ok(())
    }

    /// Apply a signed delta to one counter in place.
    ///
    /// Returns the new counters, or `None` if the entry is not cached (the
    /// delta is dropped, not queued).
    pub fn apply_delta(&self, id: &EntryId, field: CountField, delta: i64) -> Option<InteractionCounts> {
        let counts = {
            let mut envelope = self.entries.get_mut(id)?;
            envelope.value.apply(field, delta);
            envelope.value
        };

        trace!(entry = %id, ?field, delta, value = counts.get(field), "cache: delta applied");
        publish(
            &self.updates_tx,
            CacheUpdate::CountsChanged {
                id: id.clone(),
                counts,
            },
        );
        Some(counts)
    }

    /// Put one counter back to a previously observed value.
    ///
    /// Used to roll back an optimistic delta. Returns false if the entry is
    /// no longer cached.
    pub fn restore_field(&self, id: &EntryId, field: CountField, value: u64) -> bool {
        let counts = {
            let Some(mut envelope) = self.entries.get_mut(id) else {
                return false;
            };
            envelope.value.set(field, value);
            envelope.value
        };

        trace!(entry = %id, ?field, value, "cache: field restored");
        publish(
            &self.updates_tx,
            CacheUpdate::CountsChanged {
                id: id.clone(),
                counts,
            },
        );
        true
    }

    /// Drop one entry.
    pub fn invalidate(&self, id: &EntryId) {
        if self.entries.remove(id).is_some() {
            trace!(entry = %id, "cache: counts invalidated");
        }
    }

    /// Drop every entry older than the TTL. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, envelope| envelope.is_fresh(self.ttl));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "expired counts purged");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
