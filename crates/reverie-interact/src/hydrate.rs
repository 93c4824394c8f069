//! Render-ready records.

use serde::Serialize;

use reverie_store::{InteractionCounts, ViewerInteractionState};
use reverie_thread::ThreadNode;

/// A thread node merged with its interaction data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedEntry {
    #[serde(flatten)]
    pub node: ThreadNode,
    /// Cached counters, or the entry's embedded counters on a cache miss.
    pub counts: InteractionCounts,
    /// The viewer's flags. `None` means not yet known, not "false".
    pub viewer_state: Option<ViewerInteractionState>,
}

impl RenderedEntry {
    pub fn has_resonated(&self) -> Option<bool> {
        self.viewer_state.map(|s| s.has_resonated)
    }

    pub fn has_amplified(&self) -> Option<bool> {
        self.viewer_state.map(|s| s.has_amplified)
    }
}
