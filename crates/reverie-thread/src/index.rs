//! Parent and child indexes over a flat entry list.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::warn;

use reverie_store::{Entry, EntryId};

/// Oldest first, ties by id.
pub(crate) fn chronological(a: &Entry, b: &Entry) -> Ordering {
    a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))
}

/// Newest first, ties by id.
pub(crate) fn newest_first(a: &Entry, b: &Entry) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id))
}

/// Lookup tables borrowed from the input slice.
pub(crate) struct EntryIndex<'a> {
    /// First occurrence of every id.
    pub by_id: HashMap<&'a EntryId, &'a Entry>,
    /// Children of every entry that has any, oldest first.
    pub children_of: HashMap<&'a EntryId, Vec<&'a Entry>>,
    /// Entries with no parent or an absent parent, newest first.
    pub roots: Vec<&'a Entry>,
    /// Unique entries in input order.
    pub unique: Vec<&'a Entry>,
    /// Entries dropped because their id was already seen.
    pub duplicates: usize,
}

impl<'a> EntryIndex<'a> {
    pub fn new(entries: &'a [Entry]) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut unique = Vec::with_capacity(entries.len());
        let mut duplicates = 0;

        for entry in entries {
            if by_id.contains_key(&entry.id) {
                warn!(entry = %entry.id, "duplicate entry id, keeping first occurrence");
                duplicates += 1;
                continue;
            }
            by_id.insert(&entry.id, entry);
            unique.push(entry);
        }

        let mut children_of: HashMap<&EntryId, Vec<&Entry>> = HashMap::new();
        let mut roots = Vec::new();

        for &entry in &unique {
            match &entry.parent_id {
                Some(parent) if by_id.contains_key(parent) => {
                    children_of.entry(parent).or_default().push(entry);
                }
                // Missing parent: treat as a root
                _ => roots.push(entry),
            }
        }

        for children in children_of.values_mut() {
            children.sort_by(|a, b| chronological(a, b));
        }
        roots.sort_by(|a, b| newest_first(a, b));

        Self {
            by_id,
            children_of,
            roots,
            unique,
            duplicates,
        }
    }

    pub fn children(&self, id: &EntryId) -> &[&'a Entry] {
        self.children_of.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parent of `entry` if it is present in the input.
    pub fn parent(&self, entry: &Entry) -> Option<&'a Entry> {
        entry
            .parent_id
            .as_ref()
            .and_then(|parent| self.by_id.get(parent).copied())
    }
}
