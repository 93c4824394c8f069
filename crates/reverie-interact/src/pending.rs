//! Bookkeeping for in-flight toggles.

use dashmap::DashSet;

use reverie_store::{EntryId, ViewerId};

use crate::InteractionKind;

pub(crate) type PendingKey = (ViewerId, EntryId, InteractionKind);

/// Set of toggles currently awaiting the repository.
#[derive(Default)]
pub(crate) struct PendingSet {
    keys: DashSet<PendingKey>,
}

impl PendingSet {
    /// Claim a key. `None` if it is already claimed.
    pub fn acquire(&self, key: PendingKey) -> Option<PendingGuard<'_>> {
        if self.keys.insert(key.clone()) {
            Some(PendingGuard { set: self, key })
        } else {
            None
        }
    }

    pub fn contains(&self, key: &PendingKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Releases its key when dropped, including when the owning future is
/// cancelled.
pub(crate) struct PendingGuard<'a> {
    set: &'a PendingSet,
    key: PendingKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.set.keys.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PendingKey {
        ("v".into(), "1".into(), InteractionKind::Resonance)
    }

    #[test]
    fn test_second_acquire_rejected_until_drop() {
        let set = PendingSet::default();

        let guard = set.acquire(key());
        assert!(guard.is_some());
        assert!(set.acquire(key()).is_none());
        assert!(set.contains(&key()));

        drop(guard);
        assert!(!set.contains(&key()));
        assert!(set.acquire(key()).is_some());
    }

    #[test]
    fn test_kinds_are_independent() {
        let set = PendingSet::default();
        let _resonance = set.acquire(key());
        let amplification = set.acquire(("v".into(), "1".into(), InteractionKind::Amplification));
        assert!(amplification.is_some());
        assert_eq!(set.len(), 2);
    }
}
