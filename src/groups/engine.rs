/// Group reconciliation engine.
///
/// `GroupSync` owns every table the feature needs (identity map, owner record,
/// membership store, roster cache, rendered list) as explicit state behind one
/// mutex. The mutex is never held across an await: each critical section is a
/// synchronous closure passed to `with_state`. Remote calls happen between
/// critical sections, so a resync can interleave with a mutation; the later
/// writer wins and the next resync restores server truth.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::api::{GroupApi, PendingInvite};
use crate::bus::{BusError, InvalidationBus, InvalidationListener, ListenerHandle, ResyncTarget, Signal};
use crate::config::{ConfigError, SyncConfig};
use crate::groups::demo::{demo_groups, DEMO_BANNER};
use crate::groups::ids::{BackendId, IdentityMapper, LocalId};
use crate::groups::membership::{joined_set, MembershipSignals, MembershipStore};
use crate::groups::model::{normalize, GroupView, Member, Provenance};
use crate::groups::mutation::{MutationError, MutationKind};
use crate::groups::ownership::{self, OwnerRecord};
use crate::groups::roster::{RosterCache, RosterError, RosterStatus};

/// Banner shown when the catalog is unreachable and demo data is disabled.
pub const OFFLINE_BANNER: &str =
    "The group service is unreachable. The list below may be out of date.";

// ---------------------------------------------------------------------------
// Dataset mode
// ---------------------------------------------------------------------------

/// Where the rendered list currently comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetMode {
    /// Last resync reached the backend.
    Live,
    /// Catalog fetch failed; the fixed demo dataset is rendered.
    Demo { banner: String },
    /// Catalog fetch failed; the previous list is kept as-is.
    Offline { banner: String },
}

impl DatasetMode {
    pub fn banner(&self) -> Option<&str> {
        match self {
            DatasetMode::Live => None,
            DatasetMode::Demo { banner } | DatasetMode::Offline { banner } => Some(banner),
        }
    }
}

// ---------------------------------------------------------------------------
// SyncState
// ---------------------------------------------------------------------------

pub(crate) struct SyncState {
    pub(crate) identity: IdentityMapper,
    pub(crate) owners: OwnerRecord,
    pub(crate) membership: MembershipStore,
    pub(crate) rosters: RosterCache,
    /// Rendered list, local-only groups first.
    pub(crate) groups: Vec<GroupView>,
    /// Groups created locally after a failed create. They survive resyncs.
    pub(crate) local_groups: HashSet<LocalId>,
    pub(crate) in_flight: HashSet<(LocalId, MutationKind)>,
    pub(crate) pending_invites: HashMap<BackendId, Vec<PendingInvite>>,
    pub(crate) mode: DatasetMode,
}

impl SyncState {
    fn new(config: &SyncConfig) -> Self {
        SyncState {
            identity: IdentityMapper::new(),
            owners: OwnerRecord::new(),
            membership: MembershipStore::new(),
            rosters: RosterCache::new(config.roster_cache_capacity),
            groups: Vec::new(),
            local_groups: HashSet::new(),
            in_flight: HashSet::new(),
            pending_invites: HashMap::new(),
            mode: DatasetMode::Live,
        }
    }

    pub(crate) fn position(&self, local_id: LocalId) -> Option<usize> {
        self.groups.iter().position(|g| g.local_id == local_id)
    }

    pub(crate) fn group(&self, local_id: LocalId) -> Option<&GroupView> {
        self.groups.iter().find(|g| g.local_id == local_id)
    }

    pub(crate) fn group_mut(&mut self, local_id: LocalId) -> Option<&mut GroupView> {
        self.groups.iter_mut().find(|g| g.local_id == local_id)
    }

    pub(crate) fn position_of_backend(&self, backend_id: &BackendId) -> Option<usize> {
        if !backend_id.is_persisted() {
            return None;
        }
        self.groups.iter().position(|g| &g.backend_id == backend_id)
    }

    /// Record membership in the store and on the rendered view.
    pub(crate) fn set_member(&mut self, local_id: LocalId, is_member: bool) {
        if let Some(view) = self.group_mut(local_id) {
            view.is_member = is_member;
            let backend_id = view.backend_id.clone();
            self.membership.set(&backend_id, is_member);
        }
    }

    /// Drop everything known about a deleted group.
    pub(crate) fn forget(&mut self, local_id: LocalId, backend_id: &BackendId) {
        if self.local_groups.remove(&local_id) {
            self.identity.release(local_id);
        }
        self.in_flight.retain(|(id, _)| *id != local_id);
        if backend_id.is_persisted() {
            self.membership.forget(backend_id);
            self.owners.forget(backend_id);
            self.rosters.remove(backend_id);
            self.pending_invites.remove(backend_id);
        }
    }

    fn local_only_views(&self) -> Vec<GroupView> {
        self.groups
            .iter()
            .filter(|g| self.local_groups.contains(&g.local_id))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// GroupSync
// ---------------------------------------------------------------------------

pub struct GroupSync {
    pub(crate) api: Arc<dyn GroupApi>,
    pub(crate) bus: InvalidationBus,
    pub(crate) viewer: Option<String>,
    pub(crate) config: SyncConfig,
    source_id: Uuid,
    state: Mutex<SyncState>,
}

impl GroupSync {
    /// Create an engine for `viewer_id` (blank means signed out).
    pub fn new(
        api: Arc<dyn GroupApi>,
        bus: InvalidationBus,
        viewer_id: Option<&str>,
        config: SyncConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let viewer = viewer_id
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        log::info!(
            "group sync ready for {} ({})",
            viewer.as_deref().unwrap_or("<anonymous>"),
            config
        );
        Ok(GroupSync {
            api,
            bus,
            viewer,
            state: Mutex::new(SyncState::new(&config)),
            config,
            source_id: Uuid::new_v4(),
        })
    }

    /// Subscribe this engine to its bus. Dropping the handle unsubscribes.
    pub async fn listen(self: &Arc<Self>) -> Result<ListenerHandle, BusError> {
        InvalidationListener::spawn(self.clone(), &self.bus, self.config.signal_dedup_capacity)
            .await
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SyncState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub(crate) fn viewer_id(&self) -> Option<&str> {
        self.viewer.as_deref()
    }

    pub(crate) async fn emit(&self, signal: Signal, group: Option<&BackendId>) {
        self.bus.emit(self.source_id, signal, group).await;
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Snapshot of the rendered list.
    pub fn groups(&self) -> Vec<GroupView> {
        self.with_state(|s| s.groups.clone())
    }

    pub fn group(&self, local_id: LocalId) -> Option<GroupView> {
        self.with_state(|s| s.group(local_id).cloned())
    }

    /// Local id the rendered list uses for a backend id.
    pub fn local_id_for(&self, backend_id: &BackendId) -> Option<LocalId> {
        self.with_state(|s| s.identity.local_for(backend_id))
    }

    pub fn mode(&self) -> DatasetMode {
        self.with_state(|s| s.mode.clone())
    }

    /// Non-blocking banner text while degraded.
    pub fn banner(&self) -> Option<String> {
        self.with_state(|s| s.mode.banner().map(str::to_string))
    }

    pub fn is_member(&self, local_id: LocalId) -> bool {
        self.with_state(|s| s.group(local_id).map(|g| g.is_member).unwrap_or(false))
    }

    pub fn is_owner(&self, local_id: LocalId) -> bool {
        self.with_state(|s| s.group(local_id).map(|g| g.is_owner).unwrap_or(false))
    }

    pub fn is_in_flight(&self, local_id: LocalId, kind: MutationKind) -> bool {
        self.with_state(|s| s.in_flight.contains(&(local_id, kind)))
    }

    /// Operations on `local_id` still waiting for the backend.
    pub fn in_flight(&self, local_id: LocalId) -> Vec<MutationKind> {
        self.with_state(|s| {
            s.in_flight
                .iter()
                .filter(|(id, _)| *id == local_id)
                .map(|(_, kind)| *kind)
                .collect()
        })
    }

    /// Cached pending invites for a group (see `load_pending_invites`).
    pub fn pending_invites(&self, local_id: LocalId) -> Vec<PendingInvite> {
        self.with_state(|s| {
            s.group(local_id)
                .and_then(|g| s.pending_invites.get(&g.backend_id))
                .cloned()
                .unwrap_or_default()
        })
    }

    // -----------------------------------------------------------------------
    // Resync
    // -----------------------------------------------------------------------

    /// Re-fetch the catalog and re-derive identity, ownership and membership.
    ///
    /// Never fails: an unreachable catalog switches to demo or offline mode,
    /// an unreachable joined list falls back to previously known membership.
    pub async fn resync(&self) -> Vec<GroupView> {
        let catalog = match self.api.list_all_groups().await {
            Ok(catalog) => catalog,
            Err(e) => {
                log::warn!("group catalog unavailable: {}", e);
                return self.degrade();
            }
        };

        let joined = match self.api.list_my_groups().await {
            Ok(mine) => {
                let ids: Vec<BackendId> = mine.iter().map(|g| g.backend_id()).collect();
                Some(joined_set(&ids))
            }
            Err(e) => {
                log::warn!("joined groups unavailable, keeping known membership: {}", e);
                None
            }
        };

        let viewer = self.viewer_id();
        self.with_state(|state| {
            let mut seen = HashSet::new();
            let mut next_membership = HashMap::new();
            let mut views = state.local_only_views();

            for raw in &catalog {
                let mut view = normalize(raw, Provenance::Server, &mut state.identity, &mut state.owners);
                let backend_id = view.backend_id.clone();
                if backend_id.is_persisted() && !seen.insert(backend_id.clone()) {
                    log::debug!("duplicate catalog entry {} dropped", backend_id);
                    continue;
                }

                view.is_owner = ownership::is_owner(&view, &state.owners, viewer);
                view.is_member = state.membership.derive(
                    &backend_id,
                    MembershipSignals {
                        joined: joined.as_ref().map(|j| j.contains(&backend_id)),
                        is_owner: view.is_owner,
                        in_inline_roster: viewer.map(|v| view.lists_member(v)).unwrap_or(false),
                    },
                );
                if backend_id.is_persisted() {
                    next_membership.insert(backend_id, view.is_member);
                }
                views.push(view);
            }

            state.membership.replace(next_membership);
            state.groups = views;
            state.mode = DatasetMode::Live;
            log::debug!(
                "resync: {} groups ({} local-only), {} mapped ids",
                state.groups.len(),
                state.local_groups.len(),
                state.identity.len()
            );
            state.groups.clone()
        })
    }

    fn degrade(&self) -> Vec<GroupView> {
        let viewer = self.viewer_id();
        let demo_fallback = self.config.demo_fallback;
        self.with_state(|state| {
            if demo_fallback {
                let mut views = state.local_only_views();
                // Demo data never touches the owner record or identity table
                let mut scratch_identity = state.identity.clone();
                let mut scratch_owners = OwnerRecord::new();
                for raw in demo_groups() {
                    let mut view = normalize(raw, Provenance::Local, &mut scratch_identity, &mut scratch_owners);
                    view.is_owner = ownership::is_owner(&view, &scratch_owners, viewer);
                    view.is_member =
                        view.is_owner || viewer.map(|v| view.lists_member(v)).unwrap_or(false);
                    views.push(view);
                }
                state.groups = views;
                state.mode = DatasetMode::Demo {
                    banner: DEMO_BANNER.to_string(),
                };
            } else {
                state.mode = DatasetMode::Offline {
                    banner: OFFLINE_BANNER.to_string(),
                };
            }
            state.groups.clone()
        })
    }

    // -----------------------------------------------------------------------
    // Member-list cache
    // -----------------------------------------------------------------------

    /// Current roster state for a group.
    pub fn roster(&self, local_id: LocalId) -> RosterStatus {
        self.with_state(|s| match s.group(local_id) {
            None => RosterStatus::NotLoaded,
            Some(g) if g.is_local_only() => RosterStatus::Loaded(g.members.clone()),
            Some(g) => s.rosters.status(&g.backend_id),
        })
    }

    /// Expand a group's member list, fetching it if nothing is cached.
    pub async fn expand_roster(&self, local_id: LocalId) -> RosterStatus {
        let backend_id = self.with_state(|s| {
            let group = s.group(local_id)?;
            if group.is_local_only() {
                return None;
            }
            let backend_id = group.backend_id.clone();
            s.rosters.expand(&backend_id).then_some(backend_id)
        });
        if let Some(backend_id) = backend_id {
            self.load_members(&backend_id).await;
        }
        self.roster(local_id)
    }

    pub fn collapse_roster(&self, local_id: LocalId) {
        self.with_state(|s| {
            if let Some(backend_id) = s.group(local_id).map(|g| g.backend_id.clone()) {
                s.rosters.collapse(&backend_id);
            }
        });
    }

    /// Drop a group's cached roster after its membership changed, reloading
    /// it if the group is expanded.
    pub(crate) async fn invalidate_roster(&self, backend_id: &BackendId) {
        if !backend_id.is_persisted() {
            return;
        }
        if self.with_state(|s| s.rosters.invalidate(backend_id)) {
            self.load_members(backend_id).await;
        }
    }

    /// Fetch a roster into an entry already marked loading.
    async fn load_members(&self, backend_id: &BackendId) {
        let result = match self.api.list_members(backend_id).await {
            Ok(raw) => Ok(raw.iter().filter_map(Member::from_server).collect()),
            Err(e) => {
                log::warn!("member list for {} failed: {}", backend_id, e);
                Err(RosterError::from(&e))
            }
        };
        self.with_state(|s| s.rosters.finish_load(backend_id, result));
    }

    // -----------------------------------------------------------------------
    // Pending invites
    // -----------------------------------------------------------------------

    /// Refresh the pending-invite cache for one group.
    ///
    /// On failure the cache is left unchanged and the error is returned.
    pub async fn load_pending_invites(
        &self,
        local_id: LocalId,
    ) -> Result<Vec<PendingInvite>, MutationError> {
        let backend_id = self
            .with_state(|s| s.group(local_id).map(|g| g.backend_id.clone()))
            .ok_or(MutationError::UnknownGroup(local_id))?;
        if !backend_id.is_persisted() {
            return Ok(Vec::new());
        }
        match self.api.list_pending_invites(&backend_id).await {
            Ok(invites) => {
                self.with_state(|s| {
                    s.pending_invites.insert(backend_id, invites.clone());
                });
                Ok(invites)
            }
            Err(e) => {
                log::warn!("pending invites for {} unavailable: {}", backend_id, e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ResyncTarget for GroupSync {
    async fn resync_now(&self) {
        self.resync().await;
    }

    fn source_id(&self) -> Uuid {
        self.source_id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{Endpoint, Failure};
    use crate::api::{ApiError, MemoryGroupApi};
    use crate::groups::model::{RawId, Role, ServerGroup};
    use std::time::Duration;

    fn engine(api: &Arc<MemoryGroupApi>, viewer: &str) -> Arc<GroupSync> {
        let config = SyncConfig {
            local_op_delay_ms: 0,
            ..Default::default()
        };
        Arc::new(
            GroupSync::new(api.clone(), InvalidationBus::standalone(16), Some(viewer), config)
                .unwrap(),
        )
    }

    fn find<'a>(groups: &'a [GroupView], backend: &str) -> &'a GroupView {
        groups
            .iter()
            .find(|g| g.backend_id.as_str() == backend)
            .unwrap()
    }

    #[tokio::test]
    async fn test_resync_derives_owner_and_membership() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_group("A", "Group A", "1", 1, 8);
        api.seed_group("B", "Group B", "2", 2, 5);
        let sync = engine(&api, "1");

        let groups = sync.resync().await;
        assert_eq!(groups.len(), 2);

        let a = find(&groups, "A");
        assert!(a.is_owner);
        assert!(a.is_member);
        assert_eq!(a.capacity_label(), "1/8");

        let b = find(&groups, "B");
        assert!(!b.is_owner);
        assert!(!b.is_member);
        assert_eq!(b.capacity_label(), "2/5");
        assert_eq!(sync.mode(), DatasetMode::Live);
    }

    #[tokio::test]
    async fn test_local_ids_stable_across_resyncs() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_group("7c9e6679", "Group", "2", 1, 4);
        let sync = engine(&api, "1");

        let first = sync.resync().await[0].local_id;
        let second = sync.resync().await[0].local_id;
        assert_eq!(first, second);
        assert_eq!(sync.local_id_for(&BackendId::new("7c9e6679")), Some(first));
    }

    #[tokio::test]
    async fn test_duplicate_catalog_entries_collapse() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_group("A", "First", "2", 1, 4);
        api.seed_raw(ServerGroup {
            id: Some(RawId::Str("A".into())),
            name: Some("Second".into()),
            ..Default::default()
        });
        let sync = engine(&api, "1");

        let groups = sync.resync().await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "First");
    }

    #[tokio::test]
    async fn test_inline_roster_counts_as_membership() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_raw(ServerGroup {
            group_id: Some(RawId::Num(42)),
            group_name: Some("Legacy".into()),
            creator_id: Some(RawId::Num(9)),
            members: Some(vec![crate::groups::model::ServerMember {
                user_id: Some(RawId::Num(1)),
                role: Some(Role::Member),
                ..Default::default()
            }]),
            ..Default::default()
        });
        let sync = engine(&api, "1");

        let groups = sync.resync().await;
        assert_eq!(groups[0].backend_id.as_str(), "42");
        assert_eq!(groups[0].local_id, LocalId(42));
        assert!(groups[0].is_member);
        assert!(!groups[0].is_owner);
    }

    #[tokio::test]
    async fn test_catalog_failure_enters_demo_mode() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_group("A", "Group A", "1", 1, 8);
        api.fail(Endpoint::ListAll, Failure::Error(ApiError::Network("offline".into())));
        let sync = engine(&api, "1");

        let groups = sync.resync().await;
        assert_eq!(groups.len(), demo_groups().len());
        assert!(groups.iter().all(|g| g.is_local_only()));
        assert_eq!(sync.banner().as_deref(), Some(DEMO_BANNER));

        // Recovery replaces demo data and clears the banner
        api.clear_failure(Endpoint::ListAll);
        let groups = sync.resync().await;
        assert_eq!(groups.len(), 1);
        assert!(sync.banner().is_none());
    }

    #[tokio::test]
    async fn test_catalog_failure_without_demo_keeps_list() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_group("A", "Group A", "1", 1, 8);
        let config = SyncConfig {
            demo_fallback: false,
            ..Default::default()
        };
        let sync = GroupSync::new(api.clone(), InvalidationBus::standalone(16), Some("1"), config)
            .unwrap();
        sync.resync().await;

        api.fail(Endpoint::ListAll, Failure::Error(ApiError::Network("offline".into())));
        let groups = sync.resync().await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].backend_id.as_str(), "A");
        assert_eq!(sync.banner().as_deref(), Some(OFFLINE_BANNER));
    }

    #[tokio::test]
    async fn test_joined_failure_keeps_known_membership() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        let b = api.seed_group("B", "Group B", "2", 2, 5);
        api.add_member(&b, "1", Role::Member);
        let sync = engine(&api, "1");
        sync.resync().await;
        let local = sync.local_id_for(&b).unwrap();
        assert!(sync.is_member(local));

        // Joined list is down: the known value is kept
        api.fail(Endpoint::ListMine, Failure::Error(ApiError::Network("timeout".into())));
        let groups = sync.resync().await;
        assert!(find(&groups, "B").is_member);
    }

    #[tokio::test]
    async fn test_server_deletion_removes_group() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        let a = api.seed_group("A", "Group A", "2", 1, 8);
        api.seed_group("B", "Group B", "2", 1, 8);
        let sync = engine(&api, "1");
        sync.resync().await;

        api.remove_group(&a);
        let groups = sync.resync().await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].backend_id.as_str(), "B");
    }

    #[tokio::test]
    async fn test_anonymous_viewer_owns_nothing() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_group("A", "Group A", "1", 1, 8);
        let sync = GroupSync::new(api.clone(), InvalidationBus::standalone(16), Some("  "), SyncConfig::default())
            .unwrap();

        let groups = sync.resync().await;
        assert!(!groups[0].is_owner);
    }

    #[tokio::test]
    async fn test_roster_expand_and_collapse() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        let b = api.seed_group("B", "Group B", "2", 2, 5);
        api.add_member(&b, "3", Role::Member);
        let sync = engine(&api, "1");
        sync.resync().await;
        let local = sync.local_id_for(&b).unwrap();

        assert_eq!(sync.roster(local), RosterStatus::NotLoaded);
        match sync.expand_roster(local).await {
            RosterStatus::Loaded(members) => assert_eq!(members.len(), 2),
            other => panic!("unexpected roster state: {:?}", other),
        }
        // Cached: a second expansion does not refetch
        sync.expand_roster(local).await;
        assert_eq!(api.call_count(Endpoint::Members), 1);

        sync.collapse_roster(local);
        assert!(matches!(sync.roster(local), RosterStatus::Loaded(_)));
    }

    #[tokio::test]
    async fn test_roster_failure_is_stored() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        let b = api.seed_group("B", "Group B", "2", 2, 5);
        api.fail(Endpoint::Members, Failure::Error(ApiError::Network("offline".into())));
        let sync = engine(&api, "1");
        sync.resync().await;
        let local = sync.local_id_for(&b).unwrap();

        assert_eq!(
            sync.expand_roster(local).await,
            RosterStatus::Failed(RosterError::Unreachable)
        );
    }

    #[tokio::test]
    async fn test_invalidate_signal_triggers_one_resync() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        api.seed_group("A", "Group A", "2", 1, 8);
        let sync = engine(&api, "1");
        sync.resync().await;
        let handle = sync.listen().await.unwrap();

        api.seed_group("C", "Group C", "2", 1, 8);
        let before = api.call_count(Endpoint::ListAll);
        sync.bus()
            .emit(Uuid::new_v4(), Signal::GroupsInvalidate, None)
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(api.call_count(Endpoint::ListAll), before + 1);
        assert!(sync.groups().iter().any(|g| g.backend_id.as_str() == "C"));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_own_signals_do_not_echo() {
        let api = Arc::new(MemoryGroupApi::new("1"));
        let sync = engine(&api, "1");
        let handle = sync.listen().await.unwrap();

        sync.emit(Signal::GroupsInvalidate, None).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(api.call_count(Endpoint::ListAll), 0);
        handle.shutdown().await;
    }

    #[test]
    fn test_zero_capacity_config_rejected() {
        let api: Arc<dyn GroupApi> = Arc::new(MemoryGroupApi::new("1"));
        let config = SyncConfig {
            roster_cache_capacity: 0,
            ..Default::default()
        };
        assert!(GroupSync::new(api, InvalidationBus::standalone(4), Some("1"), config).is_err());
    }
}
