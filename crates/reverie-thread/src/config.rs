//! Traversal configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Order in which a thread is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalMode {
    /// Depth-first: each reply chain is followed to its end before the next.
    #[default]
    Dfs,
    /// Breadth-first: every node at one depth before any node deeper.
    Bfs,
}

impl fmt::Display for TraversalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalMode::Dfs => write!(f, "dfs"),
            TraversalMode::Bfs => write!(f, "bfs"),
        }
    }
}

impl FromStr for TraversalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dfs" => Ok(TraversalMode::Dfs),
            "bfs" => Ok(TraversalMode::Bfs),
            other => Err(format!("unknown traversal mode '{}', expected dfs or bfs", other)),
        }
    }
}

/// Shape thresholds for adaptive mode selection.
///
/// These are empirical defaults, not correctness constants. "Average
/// children" is measured over nodes that have at least one child.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveThresholds {
    /// Pick BFS when average children exceeds this...
    pub bfs_min_avg_children: f64,
    /// ...and the deepest node is shallower than this.
    pub bfs_max_depth: usize,
    /// Pick DFS when the deepest node is deeper than this...
    pub dfs_min_depth: usize,
    /// ...and average children is below this.
    pub dfs_max_avg_children: f64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            bfs_min_avg_children: 3.0,
            bfs_max_depth: 5,
            dfs_min_depth: 8,
            dfs_max_avg_children: 2.0,
        }
    }
}

/// Configuration for [`crate::ThreadBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadConfig {
    /// Mode used when none is requested and adaptive selection is off or
    /// inconclusive.
    pub default_mode: TraversalMode,
    /// Choose the mode from the thread's shape when none is requested.
    pub adaptive: bool,
    /// Nodes deeper than this are left out.
    pub max_depth: usize,
    /// Inputs larger than this are logged, not rejected.
    pub max_entries: usize,
    /// Thresholds for adaptive selection.
    pub thresholds: AdaptiveThresholds,
    /// Upper bound on nodes visited by the adaptive sample pass.
    pub sample_size: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            default_mode: TraversalMode::Dfs,
            adaptive: false,
            max_depth: 100,
            max_entries: 10_000,
            thresholds: AdaptiveThresholds::default(),
            sample_size: 1_000,
        }
    }
}

impl ThreadConfig {
    pub fn with_default_mode(mut self, mode: TraversalMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_thresholds(mut self, thresholds: AdaptiveThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }
}
