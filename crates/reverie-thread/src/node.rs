//! Output types of a thread build.

use std::time::Duration;

use serde::Serialize;

use reverie_store::{Entry, EntryId};

use crate::TraversalMode;

/// One entry placed in a reconstructed thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadNode {
    #[serde(flatten)]
    pub entry: Entry,
    /// Distance from the node's root. Roots are at 0.
    pub depth: usize,
    /// Parent this node was reached through. `None` for roots, including
    /// orphans and entries promoted out of a cycle.
    pub parent: Option<EntryId>,
    /// Children in the order they were emitted.
    pub children: Vec<EntryId>,
}

impl ThreadNode {
    pub(crate) fn new(entry: Entry, depth: usize, parent: Option<EntryId>) -> Self {
        Self {
            entry,
            depth,
            parent,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &EntryId {
        &self.entry.id
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// What happened during one build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    /// Wall time spent building.
    pub duration: Duration,
    /// Entries passed in, duplicates included.
    pub entry_count: usize,
    /// Nodes emitted.
    pub result_count: usize,
    /// Deepest emitted node.
    pub max_depth_observed: usize,
    /// Roots emitted, including promoted cycle members.
    pub root_count: usize,
    /// Mode that was actually used.
    pub mode: TraversalMode,
    /// Entries ignored because their id was already seen.
    pub duplicates: usize,
    /// Nodes skipped because they were already emitted.
    pub cycles_broken: usize,
    /// Nodes skipped for being deeper than the limit.
    pub depth_truncated: usize,
}

/// Receives stats after every build.
pub trait BuildObserver: Send + Sync {
    fn on_build(&self, stats: &BuildStats);
}
