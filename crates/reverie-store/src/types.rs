//! Core types for journal entries and interaction state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of an entry.
///
/// Source systems sometimes hand out numeric ids; they are converted to their
/// decimal string once, at the boundary, and compared as strings from then on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for EntryId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Identifier of the person looking at a feed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(pub String);

impl ViewerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ViewerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ViewerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for ViewerId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// What kind of record an entry is. Set when the entry is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A regular post.
    #[default]
    Post,
    /// A dream journal entry.
    Dream,
    /// A logbook entry.
    Logbook,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Post => write!(f, "post"),
            EntryKind::Dream => write!(f, "dream"),
            EntryKind::Logbook => write!(f, "logbook"),
        }
    }
}

/// Aggregate interaction counters for one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionCounts {
    #[serde(default)]
    pub resonance_count: u64,
    #[serde(default)]
    pub branch_count: u64,
    #[serde(default)]
    pub amplification_count: u64,
    #[serde(default)]
    pub share_count: u64,
}

/// A single counter inside [`InteractionCounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountField {
    Resonance,
    Branch,
    Amplification,
    Share,
}

impl InteractionCounts {
    /// Read one counter.
    pub fn get(&self, field: CountField) -> u64 {
        match field {
            CountField::Resonance => self.resonance_count,
            CountField::Branch => self.branch_count,
            CountField::Amplification => self.amplification_count,
            CountField::Share => self.share_count,
        }
    }

    /// Overwrite one counter.
    pub fn set(&mut self, field: CountField, value: u64) {
        match field {
            CountField::Resonance => self.resonance_count = value,
            CountField::Branch => self.branch_count = value,
            CountField::Amplification => self.amplification_count = value,
            CountField::Share => self.share_count = value,
        }
    }

    /// Apply a signed delta to one counter, clamping at zero.
    pub fn apply(&mut self, field: CountField, delta: i64) {
        let current = self.get(field);
        let next = if delta >= 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };
        self.set(field, next);
    }
}

/// Whether a viewer has applied each reaction to an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerInteractionState {
    pub has_resonated: bool,
    pub has_amplified: bool,
}

/// A single flag inside [`ViewerInteractionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerFlag {
    HasResonated,
    HasAmplified,
}

impl ViewerInteractionState {
    pub fn get(&self, flag: ViewerFlag) -> bool {
        match flag {
            ViewerFlag::HasResonated => self.has_resonated,
            ViewerFlag::HasAmplified => self.has_amplified,
        }
    }

    pub fn set(&mut self, flag: ViewerFlag, value: bool) {
        match flag {
            ViewerFlag::HasResonated => self.has_resonated = value,
            ViewerFlag::HasAmplified => self.has_amplified = value,
        }
    }
}

/// A journal entry as stored by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    /// Entry this one replies to. `None` marks a root.
    #[serde(default)]
    pub parent_id: Option<EntryId>,
    #[serde(default)]
    pub kind: EntryKind,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, rename = "interactionCounts")]
    pub counts: InteractionCounts,
}

impl Entry {
    /// Create an entry with empty content and zero counts.
    pub fn new(
        id: impl Into<EntryId>,
        parent_id: Option<EntryId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id,
            kind: EntryKind::default(),
            author: None,
            content: String::new(),
            timestamp,
            counts: InteractionCounts::default(),
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_counts(mut self, counts: InteractionCounts) -> Self {
        self.counts = counts;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Filter for [`crate::EntryRepository::get_entries`].
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub kind: Option<EntryKind>,
    pub author: Option<String>,
    /// Only entries replying directly to this entry.
    pub parent: Option<EntryId>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EntryFilter {
    /// Check whether an entry passes every set criterion (ignores `limit`).
    pub fn matches(&self, entry: &Entry) -> bool {
        if let Some(kind) = self.kind
            && entry.kind != kind
        {
            return false;
        }
        if let Some(ref author) = self.author
            && entry.author.as_deref() != Some(author.as_str())
        {
            return false;
        }
        if let Some(ref parent) = self.parent
            && entry.parent_id.as_ref() != Some(parent)
        {
            return false;
        }
        if let Some(since) = self.since
            && entry.timestamp < since
        {
            return false;
        }
        true
    }
}
