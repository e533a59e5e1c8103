//! Member-list cache: lazily loaded per-group rosters.
//!
//! Entries are tri-state: absent (not loaded), `Loading`, or `Ready` holding
//! either the roster or a classified error. Errors are stored for inline
//! display and never propagated. The cache is LRU-bounded; the set of expanded
//! groups is tracked separately so an invalidation knows whether to reload.

use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use thiserror::Error;

use crate::api::ApiError;
use crate::groups::ids::BackendId;
use crate::groups::model::Member;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    #[error("Member list unavailable: backend unreachable")]
    Unreachable,

    #[error("Member list failed to load: {0}")]
    Failed(String),
}

impl From<&ApiError> for RosterError {
    fn from(e: &ApiError) -> Self {
        if e.is_network() {
            RosterError::Unreachable
        } else {
            RosterError::Failed(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RosterEntry {
    Loading,
    Ready(Result<Vec<Member>, RosterError>),
}

/// What a view renders for one group's roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RosterStatus {
    NotLoaded,
    Loading,
    Loaded(Vec<Member>),
    Failed(RosterError),
}

// ---------------------------------------------------------------------------
// RosterCache
// ---------------------------------------------------------------------------

pub struct RosterCache {
    entries: LruCache<BackendId, RosterEntry>,
    expanded: HashSet<BackendId>,
}

impl RosterCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        RosterCache {
            entries: LruCache::new(capacity),
            expanded: HashSet::new(),
        }
    }

    pub fn status(&self, backend_id: &BackendId) -> RosterStatus {
        match self.entries.peek(backend_id) {
            None => RosterStatus::NotLoaded,
            Some(RosterEntry::Loading) => RosterStatus::Loading,
            Some(RosterEntry::Ready(Ok(members))) => RosterStatus::Loaded(members.clone()),
            Some(RosterEntry::Ready(Err(e))) => RosterStatus::Failed(e.clone()),
        }
    }

    pub fn is_expanded(&self, backend_id: &BackendId) -> bool {
        self.expanded.contains(backend_id)
    }

    /// Mark a group expanded. Returns true when a fetch should start now
    /// (nothing cached and nothing already loading).
    pub fn expand(&mut self, backend_id: &BackendId) -> bool {
        self.expanded.insert(backend_id.clone());
        self.begin_load(backend_id)
    }

    pub fn collapse(&mut self, backend_id: &BackendId) {
        self.expanded.remove(backend_id);
    }

    /// Transition not-loaded -> loading. False if an entry already exists.
    pub fn begin_load(&mut self, backend_id: &BackendId) -> bool {
        if self.entries.contains(backend_id) {
            return false;
        }
        self.entries.put(backend_id.clone(), RosterEntry::Loading);
        true
    }

    /// Store a fetch result. A result for an entry that was invalidated while
    /// the fetch was in flight is dropped.
    pub fn finish_load(&mut self, backend_id: &BackendId, result: Result<Vec<Member>, RosterError>) {
        match self.entries.peek(backend_id) {
            Some(RosterEntry::Loading) => {
                self.entries
                    .put(backend_id.clone(), RosterEntry::Ready(result));
            }
            _ => log::debug!("dropping stale roster result for {}", backend_id),
        }
    }

    /// Drop the cached roster after a membership change.
    ///
    /// Returns true when the group is still expanded and a reload should start;
    /// in that case the entry is already back in `Loading`.
    pub fn invalidate(&mut self, backend_id: &BackendId) -> bool {
        self.entries.pop(backend_id);
        if self.expanded.contains(backend_id) {
            self.entries.put(backend_id.clone(), RosterEntry::Loading);
            true
        } else {
            false
        }
    }

    /// Forget a group entirely (deleted).
    pub fn remove(&mut self, backend_id: &BackendId) {
        self.entries.pop(backend_id);
        self.expanded.remove(backend_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::model::Role;

    fn member(id: &str) -> Member {
        Member {
            user_id: id.into(),
            role: Role::Member,
            name: None,
            email: None,
            joined_at: None,
        }
    }

    #[test]
    fn test_tri_state_lifecycle() {
        let mut cache = RosterCache::new(4);
        let g = BackendId::new("g");
        assert_eq!(cache.status(&g), RosterStatus::NotLoaded);

        assert!(cache.expand(&g));
        assert_eq!(cache.status(&g), RosterStatus::Loading);
        // Second expand while loading does not start another fetch
        assert!(!cache.expand(&g));

        cache.finish_load(&g, Ok(vec![member("u1")]));
        assert_eq!(cache.status(&g), RosterStatus::Loaded(vec![member("u1")]));
        assert!(!cache.expand(&g));
    }

    #[test]
    fn test_invalidate_expanded_reloads() {
        let mut cache = RosterCache::new(4);
        let g = BackendId::new("g");
        cache.expand(&g);
        cache.finish_load(&g, Ok(vec![]));
        assert!(cache.invalidate(&g));
        assert_eq!(cache.status(&g), RosterStatus::Loading);
    }

    #[test]
    fn test_invalidate_collapsed_drops() {
        let mut cache = RosterCache::new(4);
        let g = BackendId::new("g");
        cache.expand(&g);
        cache.finish_load(&g, Ok(vec![]));
        cache.collapse(&g);
        assert!(!cache.invalidate(&g));
        assert_eq!(cache.status(&g), RosterStatus::NotLoaded);
        // Next expansion fetches fresh data
        assert!(cache.expand(&g));
    }

    #[test]
    fn test_stale_result_dropped() {
        let mut cache = RosterCache::new(4);
        let g = BackendId::new("g");
        cache.expand(&g);
        cache.collapse(&g);
        cache.invalidate(&g);
        cache.finish_load(&g, Ok(vec![member("late")]));
        assert_eq!(cache.status(&g), RosterStatus::NotLoaded);
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            RosterError::from(&ApiError::Network("offline".into())),
            RosterError::Unreachable
        );
        assert!(matches!(
            RosterError::from(&ApiError::Status {
                status: 500,
                message: "boom".into()
            }),
            RosterError::Failed(_)
        ));
    }

    #[test]
    fn test_failed_entry_is_stored() {
        let mut cache = RosterCache::new(4);
        let g = BackendId::new("g");
        cache.expand(&g);
        cache.finish_load(&g, Err(RosterError::Unreachable));
        assert_eq!(cache.status(&g), RosterStatus::Failed(RosterError::Unreachable));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = RosterCache::new(2);
        for id in ["a", "b", "c"] {
            let g = BackendId::new(id);
            cache.begin_load(&g);
            cache.finish_load(&g, Ok(vec![]));
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.status(&BackendId::new("a")), RosterStatus::NotLoaded);
    }
}
