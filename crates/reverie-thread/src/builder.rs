//! Thread reconstruction.
//!
//! Turns a flat, unordered list of entries into a traversal-ordered list of
//! [`ThreadNode`]s. Traversal is iterative (explicit stack or queue), so
//! arbitrarily deep reply chains never touch the call stack.
//!
//! Ordering rules:
//!
//! - roots are emitted newest first
//! - siblings are emitted oldest first
//! - ties on timestamp are broken by id
//!
//! Malformed input never aborts a build. Duplicate ids keep their first
//! occurrence, entries whose parent is absent become roots, nodes deeper
//! than the configured limit are left out, and reply cycles are broken by
//! promoting the oldest member of a cycle that no root reaches.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use reverie_store::{Entry, EntryId};

use crate::adaptive;
use crate::index::{EntryIndex, chronological};
use crate::{BuildObserver, BuildStats, ThreadConfig, ThreadNode, TraversalMode};

/// Builds threads from flat entry lists.
#[derive(Clone, Default)]
pub struct ThreadBuilder {
    config: ThreadConfig,
    observer: Option<Arc<dyn BuildObserver>>,
}

impl ThreadBuilder {
    pub fn new(config: ThreadConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Report stats for every build to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ThreadConfig {
        &self.config
    }

    /// Build a thread. `mode` overrides the configured default.
    pub fn build(&self, entries: &[Entry], mode: Option<TraversalMode>) -> Vec<ThreadNode> {
        self.build_with_stats(entries, mode).0
    }

    /// Build a thread and report what happened along the way.
    #[tracing::instrument(skip(self, entries), fields(entries = entries.len()))]
    pub fn build_with_stats(
        &self,
        entries: &[Entry],
        mode: Option<TraversalMode>,
    ) -> (Vec<ThreadNode>, BuildStats) {
        let start = Instant::now();

        if entries.len() > self.config.max_entries {
            warn!(
                entries = entries.len(),
                max = self.config.max_entries,
                "thread exceeds configured entry limit"
            );
        }

        let index = EntryIndex::new(entries);
        let mode = mode.unwrap_or_else(|| self.select_mode(&index));

        let mut walk = Walk::new(&index, mode, self.config.max_depth);
        for &root in &index.roots {
            walk.push_root(root);
        }
        walk.run();
        walk.recover_detached();

        let Walk {
            nodes,
            roots,
            cycles_broken,
            depth_truncated,
            ..
        } = walk;

        let stats = BuildStats {
            duration: start.elapsed(),
            entry_count: entries.len(),
            result_count: nodes.len(),
            max_depth_observed: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
            root_count: roots,
            mode,
            duplicates: index.duplicates,
            cycles_broken,
            depth_truncated,
        };

        if stats.depth_truncated > 0 {
            warn!(
                truncated = stats.depth_truncated,
                max_depth = self.config.max_depth,
                "nodes beyond depth limit were left out"
            );
        }
        info!(
            mode = %stats.mode,
            nodes = stats.result_count,
            roots = stats.root_count,
            max_depth = stats.max_depth_observed,
            duration_us = stats.duration.as_micros() as u64,
            "thread built"
        );

        if let Some(observer) = &self.observer {
            observer.on_build(&stats);
        }

        (nodes, stats)
    }

    fn select_mode(&self, index: &EntryIndex<'_>) -> TraversalMode {
        if !self.config.adaptive {
            return self.config.default_mode;
        }
        let shape = adaptive::sample(index, self.config.sample_size, self.config.max_depth);
        let mode = shape.select(&self.config.thresholds, self.config.default_mode);
        debug!(%mode, "adaptive traversal selected");
        mode
    }
}

/// A node waiting to be visited.
struct Pending<'a> {
    entry: &'a Entry,
    depth: usize,
    parent: Option<&'a EntryId>,
}

/// Mutable state of one traversal.
struct Walk<'i, 'a> {
    index: &'i EntryIndex<'a>,
    mode: TraversalMode,
    max_depth: usize,
    frontier: VecDeque<Pending<'a>>,
    visited: HashSet<&'a EntryId>,
    /// Position of each emitted node in `nodes`.
    position: HashMap<&'a EntryId, usize>,
    nodes: Vec<ThreadNode>,
    roots: usize,
    cycles_broken: usize,
    depth_truncated: usize,
}

impl<'i, 'a> Walk<'i, 'a> {
    fn new(index: &'i EntryIndex<'a>, mode: TraversalMode, max_depth: usize) -> Self {
        Self {
            index,
            mode,
            max_depth,
            frontier: VecDeque::new(),
            visited: HashSet::with_capacity(index.unique.len()),
            position: HashMap::with_capacity(index.unique.len()),
            nodes: Vec::with_capacity(index.unique.len()),
            roots: 0,
            cycles_broken: 0,
            depth_truncated: 0,
        }
    }

    /// Queue a root. Roots must be pushed newest first.
    fn push_root(&mut self, entry: &'a Entry) {
        let pending = Pending {
            entry,
            depth: 0,
            parent: None,
        };
        match self.mode {
            // Stack: the first root pushed has to end up on top
            TraversalMode::Dfs => self.frontier.push_front(pending),
            TraversalMode::Bfs => self.frontier.push_back(pending),
        }
    }

    fn pop(&mut self) -> Option<Pending<'a>> {
        match self.mode {
            TraversalMode::Dfs => self.frontier.pop_back(),
            TraversalMode::Bfs => self.frontier.pop_front(),
        }
    }

    fn run(&mut self) {
        while let Some(Pending {
            entry,
            depth,
            parent,
        }) = self.pop()
        {
            if self.visited.contains(&entry.id) {
                debug!(entry = %entry.id, "already emitted, breaking cycle");
                self.cycles_broken += 1;
                continue;
            }
            if depth > self.max_depth {
                self.depth_truncated += 1;
                continue;
            }

            self.visited.insert(&entry.id);
            self.emit(entry, depth, parent);

            let index = self.index;
            let queued = index.children(&entry.id).iter().map(|child| Pending {
                entry: *child,
                depth: depth + 1,
                parent: Some(&entry.id),
            });
            match self.mode {
                // Reverse so the oldest child pops first
                TraversalMode::Dfs => {
                    let queued: Vec<_> = queued.collect();
                    self.frontier.extend(queued.into_iter().rev());
                }
                TraversalMode::Bfs => self.frontier.extend(queued),
            }
        }
    }

    fn emit(&mut self, entry: &'a Entry, depth: usize, parent: Option<&'a EntryId>) {
        if let Some(parent) = parent
            && let Some(&at) = self.position.get(parent)
        {
            self.nodes[at].children.push(entry.id.clone());
        }
        if parent.is_none() {
            self.roots += 1;
        }

        self.position.insert(&entry.id, self.nodes.len());
        self.nodes
            .push(ThreadNode::new(entry.clone(), depth, parent.cloned()));
    }

    /// Emit cycles that no root reaches.
    ///
    /// Every entry the main pass did not visit either hangs below a visited
    /// or depth-truncated node, or sits on or below a parent cycle. Walking
    /// up the parent chain tells the two apart. For each cycle found, its
    /// oldest member becomes a root and is traversed like any other.
    fn recover_detached(&mut self) {
        let mut unvisited: Vec<&'a Entry> = self
            .index
            .unique
            .iter()
            .copied()
            .filter(|entry| !self.visited.contains(&entry.id))
            .collect();
        if unvisited.is_empty() {
            return;
        }
        unvisited.sort_by(|a, b| chronological(a, b));

        let mut classified: HashSet<&'a EntryId> = HashSet::new();

        for start in unvisited {
            if self.visited.contains(&start.id) || classified.contains(&start.id) {
                continue;
            }

            let mut path: Vec<&'a Entry> = Vec::new();
            let mut on_path: HashMap<&'a EntryId, usize> = HashMap::new();
            let mut current = Some(start);

            while let Some(entry) = current {
                if self.visited.contains(&entry.id) || classified.contains(&entry.id) {
                    break;
                }
                if let Some(&at) = on_path.get(&entry.id) {
                    let cycle = &path[at..];
                    if let Some(oldest) = cycle.iter().copied().min_by(|a, b| chronological(a, b)) {
                        warn!(
                            entry = %oldest.id,
                            members = cycle.len(),
                            "parent cycle detected, promoting oldest member to root"
                        );
                        self.push_root(oldest);
                        self.run();
                    }
                    break;
                }
                on_path.insert(&entry.id, path.len());
                path.push(entry);
                current = self.index.parent(entry);
            }

            classified.extend(path.iter().copied().map(|entry| &entry.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn entry(id: &str, parent: Option<&str>, secs: i64) -> Entry {
        Entry::new(id, parent.map(EntryId::from), Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn order(nodes: &[ThreadNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.entry.id.as_str()).collect()
    }

    fn node<'n>(nodes: &'n [ThreadNode], id: &str) -> &'n ThreadNode {
        nodes
            .iter()
            .find(|n| n.entry.id.as_str() == id)
            .unwrap_or_else(|| panic!("node {} not emitted", id))
    }

    fn children(nodes: &[ThreadNode], id: &str) -> Vec<String> {
        node(nodes, id).children.iter().map(|c| c.0.clone()).collect()
    }

    fn builder() -> ThreadBuilder {
        ThreadBuilder::new(ThreadConfig::default())
    }

    #[test]
    fn test_simple_thread_dfs() {
        let entries = vec![
            entry("1", None, 1),
            entry("2", Some("1"), 2),
            entry("3", Some("1"), 3),
        ];

        let nodes = builder().build(&entries, Some(TraversalMode::Dfs));

        assert_eq!(order(&nodes), vec!["1", "2", "3"]);
        assert_eq!(node(&nodes, "1").depth, 0);
        assert_eq!(node(&nodes, "2").depth, 1);
        assert_eq!(node(&nodes, "3").depth, 1);
        assert_eq!(children(&nodes, "1"), vec!["2", "3"]);
        assert_eq!(node(&nodes, "2").parent, Some(EntryId::from("1")));
    }

    #[test]
    fn test_dfs_follows_chain_before_sibling() {
        let entries = vec![
            entry("root", None, 0),
            entry("a", Some("root"), 1),
            entry("b", Some("root"), 2),
            entry("a1", Some("a"), 3),
            entry("a2", Some("a1"), 4),
        ];

        let nodes = builder().build(&entries, Some(TraversalMode::Dfs));
        assert_eq!(order(&nodes), vec!["root", "a", "a1", "a2", "b"]);
    }

    #[test]
    fn test_bfs_level_order() {
        let entries = vec![
            entry("root", None, 0),
            entry("a", Some("root"), 1),
            entry("b", Some("root"), 2),
            entry("a1", Some("a"), 3),
            entry("b1", Some("b"), 4),
            entry("a2", Some("a1"), 5),
        ];

        let nodes = builder().build(&entries, Some(TraversalMode::Bfs));
        assert_eq!(order(&nodes), vec!["root", "a", "b", "a1", "b1", "a2"]);

        let depths: Vec<_> = nodes.iter().map(|n| n.depth).collect();
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_roots_newest_first_both_modes() {
        let entries: Vec<_> = (1..=5).map(|i| entry(&i.to_string(), None, i)).collect();

        for mode in [TraversalMode::Dfs, TraversalMode::Bfs] {
            let nodes = builder().build(&entries, Some(mode));
            assert_eq!(order(&nodes), vec!["5", "4", "3", "2", "1"], "mode {}", mode);
        }
    }

    #[test]
    fn test_bfs_levels_span_roots() {
        let entries = vec![
            entry("old", None, 1),
            entry("new", None, 2),
            entry("old-reply", Some("old"), 3),
            entry("new-reply", Some("new"), 4),
        ];

        let nodes = builder().build(&entries, Some(TraversalMode::Bfs));
        assert_eq!(order(&nodes), vec!["new", "old", "new-reply", "old-reply"]);

        let nodes = builder().build(&entries, Some(TraversalMode::Dfs));
        assert_eq!(order(&nodes), vec!["new", "new-reply", "old", "old-reply"]);
    }

    #[test]
    fn test_timestamp_ties_broken_by_id() {
        let entries = vec![
            entry("root", None, 0),
            entry("c", Some("root"), 1),
            entry("a", Some("root"), 1),
            entry("b", Some("root"), 1),
        ];

        let nodes = builder().build(&entries, Some(TraversalMode::Dfs));
        assert_eq!(children(&nodes, "root"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_input() {
        let (nodes, stats) = builder().build_with_stats(&[], None);
        assert!(nodes.is_empty());
        assert_eq!(stats.result_count, 0);
        assert_eq!(stats.root_count, 0);
    }

    #[test]
    fn test_orphan_becomes_root() {
        let entries = vec![entry("x", Some("gone"), 1), entry("y", Some("x"), 2)];

        let nodes = builder().build(&entries, None);
        assert_eq!(order(&nodes), vec!["x", "y"]);
        assert!(node(&nodes, "x").is_root());
        assert_eq!(node(&nodes, "x").depth, 0);
        assert_eq!(node(&nodes, "y").depth, 1);
    }

    #[test]
    fn test_duplicates_emitted_once() {
        let entries = vec![
            entry("1", None, 1).with_content("first"),
            entry("1", None, 1).with_content("second"),
            entry("2", Some("1"), 2),
        ];

        let (nodes, stats) = builder().build_with_stats(&entries, None);
        assert_eq!(order(&nodes), vec!["1", "2"]);
        assert_eq!(node(&nodes, "1").entry.content, "first");
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_depth_limit() {
        let mut entries = vec![entry("0", None, 0)];
        for i in 1..10 {
            entries.push(entry(&i.to_string(), Some(&(i - 1).to_string()), i));
        }

        let builder = ThreadBuilder::new(ThreadConfig::default().with_max_depth(3));
        let (nodes, stats) = builder.build_with_stats(&entries, Some(TraversalMode::Dfs));

        assert_eq!(order(&nodes), vec!["0", "1", "2", "3"]);
        assert!(nodes.iter().all(|n| n.depth <= 3));
        assert_eq!(stats.depth_truncated, 1);
        assert!(children(&nodes, "3").is_empty());
    }

    #[test]
    fn test_depth_limit_zero_keeps_roots() {
        let entries = vec![entry("r", None, 0), entry("c", Some("r"), 1)];
        let builder = ThreadBuilder::new(ThreadConfig::default().with_max_depth(0));

        let nodes = builder.build(&entries, Some(TraversalMode::Bfs));
        assert_eq!(order(&nodes), vec!["r"]);
    }

    #[test]
    fn test_two_cycle_promotes_oldest() {
        let entries = vec![entry("a", Some("b"), 2), entry("b", Some("a"), 1)];

        let (nodes, stats) = builder().build_with_stats(&entries, Some(TraversalMode::Dfs));

        assert_eq!(order(&nodes), vec!["b", "a"]);
        assert!(node(&nodes, "b").is_root());
        assert_eq!(node(&nodes, "a").parent, Some(EntryId::from("b")));
        assert_eq!(stats.cycles_broken, 1);
        assert_eq!(stats.root_count, 1);
    }

    #[test]
    fn test_self_parent() {
        let entries = vec![entry("loop", Some("loop"), 1), entry("ok", None, 0)];

        let nodes = builder().build(&entries, None);
        assert_eq!(nodes.len(), 2);
        assert!(node(&nodes, "loop").is_root());
        assert!(children(&nodes, "loop").is_empty());
    }

    #[test]
    fn test_cycle_with_tail() {
        // c -> b -> a -> c, with d hanging off a
        let entries = vec![
            entry("a", Some("c"), 3),
            entry("b", Some("a"), 1),
            entry("c", Some("b"), 2),
            entry("d", Some("a"), 4),
        ];

        let nodes = builder().build(&entries, Some(TraversalMode::Dfs));

        assert_eq!(nodes.len(), 4);
        assert!(node(&nodes, "b").is_root());
        assert_eq!(order(&nodes), vec!["b", "c", "a", "d"]);
        assert_eq!(node(&nodes, "d").depth, 3);
    }

    #[test]
    fn test_truncated_subtree_is_not_promoted() {
        let entries = vec![
            entry("0", None, 0),
            entry("1", Some("0"), 1),
            entry("2", Some("1"), 2),
            entry("3", Some("2"), 3),
        ];
        let builder = ThreadBuilder::new(ThreadConfig::default().with_max_depth(1));

        let (nodes, stats) = builder.build_with_stats(&entries, None);
        assert_eq!(order(&nodes), vec!["0", "1"]);
        assert_eq!(stats.root_count, 1);
    }

    #[test]
    fn test_adaptive_picks_bfs_for_wide_thread() {
        let mut entries = vec![entry("root", None, 0)];
        for i in 0..5 {
            entries.push(entry(&format!("c{}", i), Some("root"), i + 1));
        }
        let builder = ThreadBuilder::new(
            ThreadConfig::default()
                .with_adaptive(true)
                .with_default_mode(TraversalMode::Dfs),
        );

        let (_, stats) = builder.build_with_stats(&entries, None);
        assert_eq!(stats.mode, TraversalMode::Bfs);
    }

    #[test]
    fn test_adaptive_picks_dfs_for_long_chain() {
        let mut entries = vec![entry("0", None, 0)];
        for i in 1..12 {
            entries.push(entry(&i.to_string(), Some(&(i - 1).to_string()), i));
        }
        let builder = ThreadBuilder::new(
            ThreadConfig::default()
                .with_adaptive(true)
                .with_default_mode(TraversalMode::Bfs),
        );

        let (_, stats) = builder.build_with_stats(&entries, None);
        assert_eq!(stats.mode, TraversalMode::Dfs);
    }

    #[test]
    fn test_explicit_mode_overrides_adaptive() {
        let mut entries = vec![entry("root", None, 0)];
        for i in 0..5 {
            entries.push(entry(&format!("c{}", i), Some("root"), i + 1));
        }
        let builder = ThreadBuilder::new(ThreadConfig::default().with_adaptive(true));

        let (_, stats) = builder.build_with_stats(&entries, Some(TraversalMode::Dfs));
        assert_eq!(stats.mode, TraversalMode::Dfs);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<BuildStats>>);

    impl BuildObserver for Recorder {
        fn on_build(&self, stats: &BuildStats) {
            self.0.lock().unwrap().push(stats.clone());
        }
    }

    #[test]
    fn test_observer_receives_stats() {
        let recorder = Arc::new(Recorder::default());
        let builder = ThreadBuilder::new(ThreadConfig::default()).with_observer(recorder.clone());

        let entries = vec![
            entry("1", None, 1),
            entry("2", Some("1"), 2),
            entry("3", Some("2"), 3),
        ];
        builder.build(&entries, None);

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].entry_count, 3);
        assert_eq!(seen[0].result_count, 3);
        assert_eq!(seen[0].max_depth_observed, 2);
        assert_eq!(seen[0].root_count, 1);
    }

    #[test]
    fn test_max_entries_is_soft() {
        let builder = ThreadBuilder::new(ThreadConfig::default().with_max_entries(2));
        let entries = vec![
            entry("1", None, 1),
            entry("2", Some("1"), 2),
            entry("3", Some("1"), 3),
            entry("4", Some("2"), 4),
            entry("5", None, 5),
            entry("6", Some("5"), 6),
        ];

        for mode in [TraversalMode::Dfs, TraversalMode::Bfs] {
            let (nodes, stats) = builder.build_with_stats(&entries, Some(mode));
            assert_eq!(nodes.len(), entries.len());
            assert_eq!(stats.entry_count, 6);
            assert_eq!(stats.result_count, 6);
        }

        let dfs = builder.build(&entries, Some(TraversalMode::Dfs));
        assert_eq!(order(&dfs), vec!["5", "6", "1", "2", "4", "3"]);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let depth = 50_000;
        let mut entries = vec![entry("0", None, 0)];
        for i in 1..depth {
            entries.push(entry(&i.to_string(), Some(&(i - 1).to_string()), i as i64));
        }
        let builder = ThreadBuilder::new(ThreadConfig::default().with_max_depth(depth));

        let nodes = builder.build(&entries, Some(TraversalMode::Dfs));
        assert_eq!(nodes.len(), depth);
        assert_eq!(nodes.last().unwrap().depth, depth - 1);
    }
}
