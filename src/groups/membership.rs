/// Membership store: `backend id -> is the viewer a member`.
///
/// Written optimistically by mutations and replaced wholesale by each resync.
/// A value set by a mutation is only ever overwritten by a fresh resync result
/// or another mutation; nothing clears it back to "unknown".

use std::collections::{HashMap, HashSet};

use crate::groups::ids::BackendId;

/// Inputs for deriving one group's membership during a resync.
#[derive(Clone, Copy, Debug)]
pub struct MembershipSignals {
    /// `Some(set contains id)` when the joined-groups fetch succeeded.
    pub joined: Option<bool>,
    pub is_owner: bool,
    pub in_inline_roster: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MembershipStore {
    members: HashMap<BackendId, bool>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, backend_id: &BackendId) -> Option<bool> {
        self.members.get(backend_id).copied()
    }

    pub fn is_member(&self, backend_id: &BackendId) -> bool {
        self.get(backend_id).unwrap_or(false)
    }

    /// Set by a mutation (optimistic apply, rollback, or re-assert).
    pub fn set(&mut self, backend_id: &BackendId, is_member: bool) {
        if backend_id.is_persisted() {
            self.members.insert(backend_id.clone(), is_member);
        }
    }

    pub fn forget(&mut self, backend_id: &BackendId) {
        self.members.remove(backend_id);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Derive one group's membership for a resync.
    ///
    /// Owner is always a member. When the joined list is unavailable, the
    /// previously known value is kept rather than blanked.
    pub fn derive(&self, backend_id: &BackendId, signals: MembershipSignals) -> bool {
        if signals.is_owner {
            return true;
        }
        match signals.joined {
            Some(joined) => joined || signals.in_inline_roster,
            None => self
                .get(backend_id)
                .unwrap_or(signals.in_inline_roster),
        }
    }

    /// Replace the whole table with a resync result.
    pub fn replace(&mut self, next: HashMap<BackendId, bool>) {
        self.members = next;
    }
}

/// Backend ids from a joined-groups response.
pub fn joined_set<'a>(ids: impl IntoIterator<Item = &'a BackendId>) -> HashSet<BackendId> {
    ids.into_iter()
        .filter(|id| id.is_persisted())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(joined: Option<bool>, is_owner: bool, in_roster: bool) -> MembershipSignals {
        MembershipSignals {
            joined,
            is_owner,
            in_inline_roster: in_roster,
        }
    }

    #[test]
    fn test_owner_is_always_member() {
        let store = MembershipStore::new();
        let g = BackendId::new("g");
        assert!(store.derive(&g, signals(Some(false), true, false)));
        assert!(store.derive(&g, signals(None, true, false)));
    }

    #[test]
    fn test_joined_set_decides_when_available() {
        let mut store = MembershipStore::new();
        let g = BackendId::new("g");
        store.set(&g, true);
        assert!(!store.derive(&g, signals(Some(false), false, false)));
        assert!(store.derive(&g, signals(Some(true), false, false)));
    }

    #[test]
    fn test_failed_joined_fetch_keeps_prior() {
        let mut store = MembershipStore::new();
        let g = BackendId::new("g");
        store.set(&g, true);
        assert!(store.derive(&g, signals(None, false, false)));

        store.set(&g, false);
        assert!(!store.derive(&g, signals(None, false, true)));

        let unseen = BackendId::new("new");
        assert!(store.derive(&unseen, signals(None, false, true)));
        assert!(!store.derive(&unseen, signals(None, false, false)));
    }

    #[test]
    fn test_local_ids_not_stored() {
        let mut store = MembershipStore::new();
        store.set(&BackendId::local(), true);
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_and_forget() {
        let mut store = MembershipStore::new();
        store.set(&BackendId::new("a"), true);
        let mut next = HashMap::new();
        next.insert(BackendId::new("b"), false);
        store.replace(next);
        assert_eq!(store.get(&BackendId::new("a")), None);
        assert_eq!(store.get(&BackendId::new("b")), Some(false));
        store.forget(&BackendId::new("b"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_joined_set_skips_local() {
        let ids = [BackendId::new("a"), BackendId::local()];
        let set = joined_set(ids.iter());
        assert_eq!(set.len(), 1);
    }
}
