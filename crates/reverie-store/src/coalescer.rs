//! Coalescing of concurrent viewer-state fetches.
//!
//! A feed render asks for interaction state once per visible entry. All
//! requests for the same viewer and the same set of ids that arrive while a
//! fetch is pending (or still debouncing) share that one fetch and receive
//! the same result, success or failure.
//!
//! The fetch runs in its own task, so it completes and clears its in-flight
//! marker even when every waiter has gone away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, trace, warn};

use crate::repository::with_timeout;
use crate::{CacheConfig, EntryId, EntryRepository, StoreError, ViewerId, ViewerInteractionState};

/// Separator between key components. Not expected inside ids.
const KEY_SEPARATOR: char = '\u{1f}';

/// Result of one coalesced load, shared by every waiter.
pub type LoadResult = Result<Arc<HashMap<EntryId, ViewerInteractionState>>, StoreError>;

type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// De-duplicates and debounces viewer-state fetches.
pub struct BatchCoalescer {
    repository: Arc<dyn EntryRepository>,
    in_flight: Arc<DashMap<String, SharedLoad>>,
    debounce: Duration,
    timeout: Duration,
}

impl BatchCoalescer {
    /// Create a coalescer using the debounce and load timeout from `config`.
    pub fn new(repository: Arc<dyn EntryRepository>, config: &CacheConfig) -> Self {
        Self {
            repository,
            in_flight: Arc::new(DashMap::new()),
            debounce: config.debounce,
            timeout: config.load_timeout,
        }
    }

    /// Key identifying a request: the viewer plus the sorted, de-duplicated ids.
    pub fn key(viewer: &ViewerId, ids: &[EntryId]) -> String {
        let mut sorted: Vec<&str> = ids.iter().map(EntryId::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut key = String::with_capacity(viewer.as_str().len() + sorted.len() * 8);
        key.push_str(viewer.as_str());
        for id in sorted {
            key.push(KEY_SEPARATOR);
            key.push_str(id);
        }
        key
    }

    /// Number of loads currently debouncing or in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Load a viewer's flags for `ids`, joining an identical pending load if
    /// there is one.
    pub async fn load(&self, viewer: &ViewerId, ids: &[EntryId]) -> LoadResult {
        self.load_with(viewer, ids, |_, _| {}).await
    }

    /// Like [`load`](Self::load), running `on_fetched` once with the fetched
    /// states before any waiter is resolved.
    ///
    /// `on_fetched` only runs for the caller that starts the fetch; callers
    /// that join a pending load have theirs dropped.
    pub async fn load_with<F>(&self, viewer: &ViewerId, ids: &[EntryId], on_fetched: F) -> LoadResult
    where
        F: FnOnce(&ViewerId, &HashMap<EntryId, ViewerInteractionState>) + Send + 'static,
    {
        let key = Self::key(viewer, ids);

        let shared = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(pending) => {
                trace!(viewer = %viewer, "joining pending viewer-state load");
                pending.get().clone()
            }
            Entry::Vacant(slot) => {
                let mut unique = ids.to_vec();
                unique.sort();
                unique.dedup();

                let task = tokio::spawn(self.fetch(key, viewer.clone(), unique, on_fetched));
                let load = task
                    .map(|joined| {
                        joined.unwrap_or_else(|e| {
                            Err(StoreError::Unavailable(format!(
                                "viewer-state load task ended: {}",
                                e
                            )))
                        })
                    })
                    .boxed()
                    .shared();
                slot.insert(load.clone());
                load
            }
        };

        shared.await
    }

    fn fetch<F>(
        &self,
        key: String,
        viewer: ViewerId,
        ids: Vec<EntryId>,
        on_fetched: F,
    ) -> impl std::future::Future<Output = LoadResult> + Send + 'static
    where
        F: FnOnce(&ViewerId, &HashMap<EntryId, ViewerInteractionState>) + Send + 'static,
    {
        let repository = Arc::clone(&self.repository);
        let in_flight = Arc::clone(&self.in_flight);
        let debounce = self.debounce;
        let timeout = self.timeout;

        async move {
            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
            }

            debug!(viewer = %viewer, count = ids.len(), "fetching viewer states");
            let fetched = with_timeout(
                "get_viewer_states",
                timeout,
                repository.get_viewer_states(&viewer, &ids),
            )
            .await;

            let result = match fetched {
                Ok(mut raw) => {
                    // Every requested id gets a state so the loaded set is never partial.
                    let states: HashMap<_, _> = ids
                        .iter()
                        .map(|id| (id.clone(), raw.remove(id).unwrap_or_default()))
                        .collect();
                    on_fetched(&viewer, &states);
                    Ok(Arc::new(states))
                }
                Err(e) => {
                    warn!(viewer = %viewer, error = %e, "viewer-state load failed");
                    Err(e)
                }
            };

            in_flight.remove(&key);
            result
        }
    }
}
