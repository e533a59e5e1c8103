//! In-memory `GroupApi` backend.
//!
//! Behaves like a small single-viewer group service: a catalog, per-group
//! rosters, pending invites, sessions and notification logs. Every endpoint can
//! be made to fail (or answer `false`) so rollback paths can be exercised, and
//! every call is recorded for assertions.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{
    ApiError, GroupApi, GroupNotice, GroupPatch, NewGroup, NewSession, NotificationPayload,
    PendingInvite, Result, SessionRecord,
};
use crate::groups::ids::BackendId;
use crate::groups::model::{RawId, Role, ServerGroup, ServerMember};

/// Endpoint selector for failure injection and call inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListAll,
    ListMine,
    Create,
    Update,
    Delete,
    Join,
    Leave,
    Invite,
    PendingInvites,
    Members,
    Notify,
    CreateNotification,
    CreateSession,
    Reminder,
    AcceptInvite,
    DeclineInvite,
}

/// How an endpoint misbehaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Boolean endpoints answer `Ok(false)`; data endpoints answer 422.
    Reject,
    Error(ApiError),
}

#[derive(Default)]
struct Backend {
    viewer: String,
    catalog: Vec<ServerGroup>,
    rosters: HashMap<BackendId, Vec<ServerMember>>,
    joined: HashSet<BackendId>,
    invites: HashMap<BackendId, Vec<PendingInvite>>,
    sessions: Vec<SessionRecord>,
    reminders: Vec<String>,
    notices: Vec<(BackendId, GroupNotice)>,
    notifications: Vec<NotificationPayload>,
    failures: HashMap<Endpoint, Failure>,
    calls: Vec<(Endpoint, Option<BackendId>)>,
    invite_responses: bool,
    joined_lag: bool,
    latency: Duration,
    next_id: u64,
}

impl Backend {
    fn position(&self, id: &BackendId) -> Option<usize> {
        self.catalog.iter().position(|g| &g.backend_id() == id)
    }

    fn group_mut(&mut self, id: &BackendId) -> Option<&mut ServerGroup> {
        self.catalog.iter_mut().find(|g| &g.backend_id() == id)
    }

    fn is_listed(&self, id: &BackendId, user: &str) -> bool {
        self.rosters
            .get(id)
            .map(|r| r.iter().any(|m| member_id(m) == user))
            .unwrap_or(false)
    }

    fn adjust_count(&mut self, id: &BackendId, delta: i64) {
        if let Some(group) = self.group_mut(id) {
            let count = group.member_count.unwrap_or(0) as i64 + delta;
            group.member_count = Some(count.max(0) as u32);
        }
    }
}

fn member_id(m: &ServerMember) -> String {
    m.user_id.as_ref().map(|r| r.to_string()).unwrap_or_default()
}

fn roster_entry(user: &str, role: Role) -> ServerMember {
    ServerMember {
        user_id: Some(RawId::Str(user.to_string())),
        role: Some(role),
        ..Default::default()
    }
}

/// In-process group service for one viewer.
pub struct MemoryGroupApi {
    inner: Mutex<Backend>,
}

impl MemoryGroupApi {
    pub fn new(viewer_id: &str) -> Self {
        MemoryGroupApi {
            inner: Mutex::new(Backend {
                viewer: viewer_id.to_string(),
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Add a rich-shaped group owned by `creator` with `count` members.
    ///
    /// The creator is placed on the roster as owner; if the creator is the
    /// viewer the group also appears in the joined list.
    pub fn seed_group(
        &self,
        id: &str,
        name: &str,
        creator: &str,
        count: u32,
        max_members: u32,
    ) -> BackendId {
        let backend_id = BackendId::new(id);
        let mut b = self.backend();
        b.catalog.push(ServerGroup {
            id: Some(RawId::Str(id.to_string())),
            name: Some(name.to_string()),
            max_members: Some(max_members),
            is_public: Some(true),
            created_by: Some(RawId::Str(creator.to_string())),
            member_count: Some(count),
            ..Default::default()
        });
        b.rosters
            .insert(backend_id.clone(), vec![roster_entry(creator, Role::Owner)]);
        if creator == b.viewer {
            b.joined.insert(backend_id.clone());
        }
        backend_id
    }

    /// Add an arbitrary payload to the catalog as-is.
    pub fn seed_raw(&self, group: ServerGroup) {
        self.backend().catalog.push(group);
    }

    /// Put `user` on a group's roster (counts are left alone).
    pub fn add_member(&self, id: &BackendId, user: &str, role: Role) {
        let mut b = self.backend();
        b.rosters
            .entry(id.clone())
            .or_default()
            .push(roster_entry(user, role));
        if user == b.viewer {
            b.joined.insert(id.clone());
        }
    }

    /// Mark the viewer as invited to a group.
    pub fn invite_viewer(&self, id: &BackendId) {
        let mut b = self.backend();
        let viewer = b.viewer.clone();
        if let Some(group) = b.group_mut(id) {
            group.is_invited = Some(true);
        }
        b.invites.entry(id.clone()).or_default().push(PendingInvite {
            user_id: viewer,
            invited_by: None,
            created_at: None,
        });
    }

    /// Remove a group behind the engine's back (another client deleted it).
    pub fn remove_group(&self, id: &BackendId) {
        let mut b = self.backend();
        if let Some(pos) = b.position(id) {
            b.catalog.remove(pos);
        }
        b.joined.remove(id);
    }

    // -----------------------------------------------------------------------
    // Behaviour knobs
    // -----------------------------------------------------------------------

    pub fn fail(&self, endpoint: Endpoint, failure: Failure) {
        self.backend().failures.insert(endpoint, failure);
    }

    pub fn clear_failure(&self, endpoint: Endpoint) {
        self.backend().failures.remove(&endpoint);
    }

    /// Enable the optional accept/decline invite endpoints.
    pub fn set_invite_responses(&self, enabled: bool) {
        self.backend().invite_responses = enabled;
    }

    /// When on, joins and leaves are not yet visible in `list_my_groups`.
    pub fn set_joined_lag(&self, lag: bool) {
        self.backend().joined_lag = lag;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.backend().latency = latency;
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.backend()
            .calls
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .count()
    }

    /// Group ids passed to `endpoint`, in call order.
    pub fn calls_for(&self, endpoint: Endpoint) -> Vec<BackendId> {
        self.backend()
            .calls
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .filter_map(|(_, id)| id.clone())
            .collect()
    }

    pub fn member_count(&self, id: &BackendId) -> Option<u32> {
        let b = self.backend();
        b.position(id).and_then(|i| b.catalog[i].member_count)
    }

    pub fn contains(&self, id: &BackendId) -> bool {
        self.backend().position(id).is_some()
    }

    pub fn notices(&self) -> Vec<(BackendId, GroupNotice)> {
        self.backend().notices.clone()
    }

    pub fn notifications(&self) -> Vec<NotificationPayload> {
        self.backend().notifications.clone()
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.backend().sessions.clone()
    }

    pub fn reminders(&self) -> Vec<String> {
        self.backend().reminders.clone()
    }

    // -----------------------------------------------------------------------
    // Call gating
    // -----------------------------------------------------------------------

    async fn enter(&self, endpoint: Endpoint, id: Option<&BackendId>) -> Option<Failure> {
        let latency = self.backend().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut b = self.backend();
        b.calls.push((endpoint, id.cloned()));
        b.failures.get(&endpoint).cloned()
    }

    async fn gate(&self, endpoint: Endpoint, id: Option<&BackendId>) -> Result<()> {
        match self.enter(endpoint, id).await {
            None => Ok(()),
            Some(Failure::Reject) => Err(ApiError::Status {
                status: 422,
                message: "rejected".into(),
            }),
            Some(Failure::Error(e)) => Err(e),
        }
    }

    /// `Ok(Some(false))` for an injected rejection; `Ok(None)` to proceed.
    async fn gate_bool(&self, endpoint: Endpoint, id: &BackendId) -> Result<Option<bool>> {
        match self.enter(endpoint, Some(id)).await {
            None => Ok(None),
            Some(Failure::Reject) => Ok(Some(false)),
            Some(Failure::Error(e)) => Err(e),
        }
    }
}

#[async_trait]
impl GroupApi for MemoryGroupApi {
    async fn list_all_groups(&self) -> Result<Vec<ServerGroup>> {
        self.gate(Endpoint::ListAll, None).await?;
        Ok(self.backend().catalog.clone())
    }

    async fn list_my_groups(&self) -> Result<Vec<ServerGroup>> {
        self.gate(Endpoint::ListMine, None).await?;
        let b = self.backend();
        Ok(b.catalog
            .iter()
            .filter(|g| b.joined.contains(&g.backend_id()))
            .cloned()
            .collect())
    }

    async fn create_group(&self, group: &NewGroup) -> Result<Option<ServerGroup>> {
        self.gate(Endpoint::Create, None).await?;
        let mut b = self.backend();
        let id = format!("grp-{}", b.next_id);
        b.next_id += 1;
        let viewer = b.viewer.clone();
        let created = ServerGroup {
            id: Some(RawId::Str(id.clone())),
            name: Some(group.name.clone()),
            description: Some(group.description.clone()),
            max_members: group.max_members,
            is_public: Some(group.is_public),
            group_type: group.group_type.clone(),
            created_by: Some(RawId::Str(viewer.clone())),
            member_count: Some(1),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };
        let backend_id = BackendId::new(id);
        b.catalog.push(created.clone());
        b.rosters
            .insert(backend_id.clone(), vec![roster_entry(&viewer, Role::Owner)]);
        b.joined.insert(backend_id);
        Ok(Some(created))
    }

    async fn update_group(&self, id: &BackendId, patch: &GroupPatch) -> Result<ServerGroup> {
        self.gate(Endpoint::Update, Some(id)).await?;
        let mut b = self.backend();
        let group = b.group_mut(id).ok_or_else(|| ApiError::Status {
            status: 404,
            message: format!("group {} not found", id),
        })?;
        if let Some(name) = &patch.name {
            group.name = Some(name.clone());
        }
        if let Some(description) = &patch.description {
            group.description = Some(description.clone());
        }
        if let Some(max) = patch.max_members {
            group.max_members = Some(max);
        }
        group.updated_at = Some(chrono::Utc::now().to_rfc3339());
        Ok(group.clone())
    }

    async fn delete_group(&self, id: &BackendId) -> Result<bool> {
        if let Some(answer) = self.gate_bool(Endpoint::Delete, id).await? {
            return Ok(answer);
        }
        let mut b = self.backend();
        match b.position(id) {
            Some(pos) => {
                b.catalog.remove(pos);
                b.rosters.remove(id);
                b.joined.remove(id);
                b.invites.remove(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn join_group(&self, id: &BackendId) -> Result<bool> {
        if let Some(answer) = self.gate_bool(Endpoint::Join, id).await? {
            return Ok(answer);
        }
        let mut b = self.backend();
        let viewer = b.viewer.clone();
        let Some(pos) = b.position(id) else {
            return Ok(false);
        };
        if b.is_listed(id, &viewer) {
            return Ok(true);
        }
        let group = &b.catalog[pos];
        if let (Some(count), Some(max)) = (group.member_count, group.max_members) {
            if count >= max {
                return Ok(false);
            }
        }
        b.rosters
            .entry(id.clone())
            .or_default()
            .push(roster_entry(&viewer, Role::Member));
        b.adjust_count(id, 1);
        if !b.joined_lag {
            b.joined.insert(id.clone());
        }
        // Joining consumes any outstanding invite
        if let Some(pending) = b.invites.get_mut(id) {
            pending.retain(|p| p.user_id != viewer);
        }
        if let Some(group) = b.group_mut(id) {
            if group.is_invited == Some(true) {
                group.is_invited = Some(false);
            }
        }
        Ok(true)
    }

    async fn leave_group(&self, id: &BackendId) -> Result<bool> {
        if let Some(answer) = self.gate_bool(Endpoint::Leave, id).await? {
            return Ok(answer);
        }
        let mut b = self.backend();
        let viewer = b.viewer.clone();
        if !b.is_listed(id, &viewer) {
            return Ok(false);
        }
        if let Some(roster) = b.rosters.get_mut(id) {
            roster.retain(|m| member_id(m) != viewer);
        }
        b.adjust_count(id, -1);
        if !b.joined_lag {
            b.joined.remove(id);
        }
        Ok(true)
    }

    async fn invite_to_group(&self, id: &BackendId, user_ids: &[String]) -> Result<bool> {
        if let Some(answer) = self.gate_bool(Endpoint::Invite, id).await? {
            return Ok(answer);
        }
        let mut b = self.backend();
        if b.position(id).is_none() {
            return Ok(false);
        }
        let inviter = b.viewer.clone();
        let pending = b.invites.entry(id.clone()).or_default();
        for user in user_ids {
            if !pending.iter().any(|p| &p.user_id == user) {
                pending.push(PendingInvite {
                    user_id: user.clone(),
                    invited_by: Some(inviter.clone()),
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                });
            }
        }
        Ok(true)
    }

    async fn list_pending_invites(&self, id: &BackendId) -> Result<Vec<PendingInvite>> {
        self.gate(Endpoint::PendingInvites, Some(id)).await?;
        Ok(self.backend().invites.get(id).cloned().unwrap_or_default())
    }

    async fn list_members(&self, id: &BackendId) -> Result<Vec<ServerMember>> {
        self.gate(Endpoint::Members, Some(id)).await?;
        Ok(self.backend().rosters.get(id).cloned().unwrap_or_default())
    }

    async fn notify_group(&self, id: &BackendId, notice: &GroupNotice) -> Result<bool> {
        if let Some(answer) = self.gate_bool(Endpoint::Notify, id).await? {
            return Ok(answer);
        }
        self.backend().notices.push((id.clone(), notice.clone()));
        Ok(true)
    }

    async fn create_notification(&self, notification: &NotificationPayload) -> Result<bool> {
        self.gate(Endpoint::CreateNotification, None).await?;
        self.backend().notifications.push(notification.clone());
        Ok(true)
    }

    async fn create_session(&self, session: &NewSession) -> Result<SessionRecord> {
        self.gate(Endpoint::CreateSession, session.group_id.as_ref()).await?;
        let mut b = self.backend();
        let record = SessionRecord {
            id: format!("ses-{}", b.next_id),
            title: session.title.clone(),
            starts_at: session.starts_at.clone(),
            group_id: session.group_id.clone(),
        };
        b.next_id += 1;
        b.sessions.push(record.clone());
        Ok(record)
    }

    async fn schedule_session_reminder(&self, session_id: &str) -> Result<bool> {
        self.gate(Endpoint::Reminder, None).await?;
        self.backend().reminders.push(session_id.to_string());
        Ok(true)
    }

    async fn accept_invite(&self, id: &BackendId) -> Result<bool> {
        if !self.backend().invite_responses {
            return Err(ApiError::Unsupported);
        }
        if let Some(answer) = self.gate_bool(Endpoint::AcceptInvite, id).await? {
            return Ok(answer);
        }
        let mut b = self.backend();
        let viewer = b.viewer.clone();
        if let Some(pending) = b.invites.get_mut(id) {
            pending.retain(|p| p.user_id != viewer);
        }
        if let Some(group) = b.group_mut(id) {
            group.is_invited = Some(false);
        }
        if !b.is_listed(id, &viewer) {
            b.rosters
                .entry(id.clone())
                .or_default()
                .push(roster_entry(&viewer, Role::Member));
            b.adjust_count(id, 1);
        }
        b.joined.insert(id.clone());
        Ok(true)
    }

    async fn decline_invite(&self, id: &BackendId) -> Result<bool> {
        if !self.backend().invite_responses {
            return Err(ApiError::Unsupported);
        }
        if let Some(answer) = self.gate_bool(Endpoint::DeclineInvite, id).await? {
            return Ok(answer);
        }
        let mut b = self.backend();
        let viewer = b.viewer.clone();
        if let Some(pending) = b.invites.get_mut(id) {
            pending.retain(|p| p.user_id != viewer);
        }
        if let Some(group) = b.group_mut(id) {
            group.is_invited = Some(false);
        }
        Ok(true)
    }
}
