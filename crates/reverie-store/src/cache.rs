//! Shared pieces of the interaction caches.
//!
//! Both caches expire purely by age and explicit invalidation. There is no
//! size-based eviction.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::{EntryId, InteractionCounts, ViewerId, ViewerInteractionState};

/// Broadcast channel capacity for cache updates.
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// A cached value and the moment it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEnvelope<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> CacheEnvelope<T> {
    pub fn new(value: T, fetched_at: Instant) -> Self {
        Self { value, fetched_at }
    }

    /// Whether the value is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Tunables for the caches and the batch coalescer.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which cached counters are no longer trusted.
    pub count_ttl: Duration,
    /// Age after which a viewer's cached flags are no longer trusted.
    pub viewer_ttl: Duration,
    /// How long the coalescer waits before issuing a batch fetch.
    pub debounce: Duration,
    /// Deadline for a coalesced viewer-state fetch.
    pub load_timeout: Duration,
    /// Deadline for a counter refresh.
    pub refresh_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            count_ttl: Duration::from_secs(30),
            viewer_ttl: Duration::from_secs(30),
            debounce: Duration::from_millis(100),
            load_timeout: Duration::from_secs(10),
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    pub fn with_count_ttl(mut self, ttl: Duration) -> Self {
        self.count_ttl = ttl;
        self
    }

    pub fn with_viewer_ttl(mut self, ttl: Duration) -> Self {
        self.viewer_ttl = ttl;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }
}

/// Update event for cache subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheUpdate {
    /// Counters were overwritten from the repository.
    CountsRefreshed { ids: Vec<EntryId> },
    /// Counters for one entry changed in place.
    CountsChanged {
        id: EntryId,
        counts: InteractionCounts,
    },
    /// A viewer's flags for one entry changed in place.
    ViewerStateChanged {
        viewer: ViewerId,
        id: EntryId,
        state: Option<ViewerInteractionState>,
    },
    /// A viewer's flags were loaded from the repository.
    ViewerStatesLoaded { viewer: ViewerId, ids: Vec<EntryId> },
    /// Everything cached for a viewer was dropped.
    ViewerInvalidated { viewer: ViewerId },
}

/// Create a sender that several caches can share.
pub fn update_channel() -> broadcast::Sender<CacheUpdate> {
    let (tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
    tx
}

/// Send an update, ignoring the absence of subscribers.
pub(crate) fn publish(tx: &broadcast::Sender<CacheUpdate>, update: CacheUpdate) {
    if tx.send(update).is_err() {
        tracing::trace!("no subscribers for cache update");
    }
}
