//! Adaptive traversal selection.
//!
//! A bounded breadth-first sample from the roots measures how deep and
//! how bushy a thread is, then picks the mode that suits that shape.
//! Wide and shallow threads read better breadth-first. Long narrow reply
//! chains read better depth-first.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use reverie_store::EntryId;

use crate::index::EntryIndex;
use crate::{AdaptiveThresholds, TraversalMode};

/// Shape measured by the sample pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThreadShape {
    /// Deepest node seen.
    pub max_depth: usize,
    /// Mean children over sampled nodes that have at least one child.
    pub avg_children: f64,
    /// Nodes visited by the sample.
    pub sampled: usize,
}

impl ThreadShape {
    /// Pick a mode, falling back to `default` when neither rule fires.
    pub fn select(&self, thresholds: &AdaptiveThresholds, default: TraversalMode) -> TraversalMode {
        if self.avg_children > thresholds.bfs_min_avg_children
            && self.max_depth < thresholds.bfs_max_depth
        {
            TraversalMode::Bfs
        } else if self.max_depth > thresholds.dfs_min_depth
            && self.avg_children < thresholds.dfs_max_avg_children
        {
            TraversalMode::Dfs
        } else {
            default
        }
    }
}

/// Sample at most `sample_size` nodes, never deeper than `max_depth`.
pub(crate) fn sample(index: &EntryIndex<'_>, sample_size: usize, max_depth: usize) -> ThreadShape {
    let mut queue: VecDeque<(&EntryId, usize)> =
        index.roots.iter().map(|root| (&root.id, 0)).collect();
    let mut seen: HashSet<&EntryId> = HashSet::new();

    let mut shape = ThreadShape::default();
    let mut parents = 0usize;
    let mut child_total = 0usize;

    while let Some((id, depth)) = queue.pop_front() {
        if shape.sampled >= sample_size {
            break;
        }
        if depth > max_depth || !seen.insert(id) {
            continue;
        }

        shape.sampled += 1;
        shape.max_depth = shape.max_depth.max(depth);

        let children = index.children(id);
        if !children.is_empty() {
            parents += 1;
            child_total += children.len();
            queue.extend(children.iter().map(|child| (&child.id, depth + 1)));
        }
    }

    if parents > 0 {
        shape.avg_children = child_total as f64 / parents as f64;
    }

    debug!(
        sampled = shape.sampled,
        max_depth = shape.max_depth,
        avg_children = shape.avg_children,
        "thread shape sampled"
    );
    shape
}
