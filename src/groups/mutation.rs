/// Mutation Coordinator.
///
/// Every membership-changing operation on an existing group goes through
/// `GroupSync::optimistic`: apply locally, call the backend, roll back if the
/// call fails. Groups without a backend id never reach the network; they
/// succeed after `SyncConfig::local_op_delay_ms`. Failures are logged and
/// returned, never retried.
///
/// Create has nothing to apply before the backend answers, so it runs its own
/// confirm-or-fallback path.

use serde_json::json;
use std::fmt;
use std::future::Future;
use thiserror::Error;

use crate::api::{ApiError, GroupNotice, GroupPatch, NewGroup, NewSession, NotificationPayload, SessionRecord};
use crate::bus::Signal;
use crate::groups::engine::{GroupSync, SyncState};
use crate::groups::ids::{BackendId, LocalId};
use crate::groups::model::{normalize, GroupView, Provenance, RawId, ServerGroup};
use crate::limits::MAX_INVITEES_PER_CALL;

// ---------------------------------------------------------------------------
// Kinds and errors
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Join,
    Leave,
    Delete,
    Create,
    Update,
    AcceptInvite,
    DeclineInvite,
    Invite,
    ScheduleSession,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Join => "join",
            MutationKind::Leave => "leave",
            MutationKind::Delete => "delete",
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::AcceptInvite => "accept-invite",
            MutationKind::DeclineInvite => "decline-invite",
            MutationKind::Invite => "invite",
            MutationKind::ScheduleSession => "schedule-session",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Unknown group {0}")]
    UnknownGroup(LocalId),

    #[error("Only the group owner can do this")]
    NotOwner,

    #[error("Only group members can do this")]
    NotMember,

    #[error("Backend rejected {0}")]
    Rejected(MutationKind),

    #[error("Too many invitees: {count} (max {max})")]
    TooManyInvitees { count: usize, max: usize },

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl MutationError {
    /// True when the backend was reached and said no (or could not be reached).
    pub fn is_remote(&self) -> bool {
        matches!(self, MutationError::Rejected(_) | MutationError::Api(_))
    }
}

pub type Result<T> = std::result::Result<T, MutationError>;

/// Outcome of the remote half of a mutation.
pub(crate) enum Applied<T> {
    Remote { backend_id: BackendId, value: T },
    LocalOnly,
}

/// Map a boolean backend answer onto the error taxonomy.
fn accepted(kind: MutationKind, answer: crate::api::Result<bool>) -> Result<()> {
    if answer? {
        Ok(())
    } else {
        Err(MutationError::Rejected(kind))
    }
}

/// Membership set by a confirmed mutation, written past whatever the
/// follow-up resync derived.
fn reassert_member(state: &mut SyncState, local_id: LocalId, backend_id: &BackendId, is_member: bool) {
    state.membership.set(backend_id, is_member);
    if let Some(view) = state.group_mut(local_id) {
        view.is_member = is_member;
    }
}

fn require_owner(state: &mut SyncState, local_id: LocalId) -> Result<&mut GroupView> {
    let view = state
        .group_mut(local_id)
        .ok_or(MutationError::UnknownGroup(local_id))?;
    if !view.is_owner {
        return Err(MutationError::NotOwner);
    }
    Ok(view)
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

impl GroupSync {
    /// Optimistic apply -> remote call -> rollback on failure.
    ///
    /// `apply` runs under the state lock and returns the snapshot `rollback`
    /// needs. `remote` is skipped for local-only groups. The pair
    /// `(local_id, kind)` is marked in flight until the remote call returns.
    pub(crate) async fn optimistic<S, T, A, R, Fut, B>(
        &self,
        local_id: LocalId,
        kind: MutationKind,
        apply: A,
        remote: R,
        rollback: B,
    ) -> Result<Applied<T>>
    where
        A: FnOnce(&mut SyncState) -> Result<S>,
        R: FnOnce(BackendId) -> Fut,
        Fut: Future<Output = Result<T>>,
        B: FnOnce(&mut SyncState, S),
    {
        let (backend_id, snapshot) = self.with_state(|state| {
            let backend_id = state
                .group(local_id)
                .map(|g| g.backend_id.clone())
                .ok_or(MutationError::UnknownGroup(local_id))?;
            let snapshot = apply(state)?;
            state.in_flight.insert((local_id, kind));
            Ok::<_, MutationError>((backend_id, snapshot))
        })?;

        if !backend_id.is_persisted() {
            tokio::time::sleep(self.config.local_op_delay()).await;
            self.with_state(|state| state.in_flight.remove(&(local_id, kind)));
            log::debug!("{} on local-only group {} applied locally", kind, local_id);
            return Ok(Applied::LocalOnly);
        }

        let outcome = remote(backend_id.clone()).await;
        self.with_state(|state| {
            state.in_flight.remove(&(local_id, kind));
            if outcome.is_err() {
                rollback(state, snapshot);
            }
        });

        match outcome {
            Ok(value) => Ok(Applied::Remote { backend_id, value }),
            Err(e) => {
                log::error!("{} on group {} failed, rolled back: {}", kind, backend_id, e);
                Err(e)
            }
        }
    }

    async fn notify_best_effort(&self, backend_id: &BackendId, notice: GroupNotice) {
        match self.api.notify_group(backend_id, &notice).await {
            Ok(true) => {}
            Ok(false) => log::warn!("notice '{}' to {} was rejected", notice.title, backend_id),
            Err(e) => log::warn!("notice '{}' to {} failed: {}", notice.title, backend_id, e),
        }
    }

    fn name_of(&self, local_id: LocalId) -> Result<String> {
        self.with_state(|s| s.group(local_id).map(|g| g.name.clone()))
            .ok_or(MutationError::UnknownGroup(local_id))
    }

    // -----------------------------------------------------------------------
    // Join / leave
    // -----------------------------------------------------------------------

    pub async fn join(&self, local_id: LocalId) -> Result<()> {
        let kind = MutationKind::Join;
        let applied = self
            .optimistic(
                local_id,
                kind,
                |state| {
                    let view = state
                        .group_mut(local_id)
                        .ok_or(MutationError::UnknownGroup(local_id))?;
                    let snapshot = (view.member_count, view.is_member);
                    view.member_count = view.member_count.map(|c| c.saturating_add(1));
                    state.set_member(local_id, true);
                    Ok(snapshot)
                },
                |backend_id| async move { accepted(kind, self.api.join_group(&backend_id).await) },
                |state, (count, was_member)| {
                    if let Some(view) = state.group_mut(local_id) {
                        view.member_count = count;
                    }
                    state.set_member(local_id, was_member);
                },
            )
            .await?;

        if let Applied::Remote { backend_id, .. } = applied {
            self.invalidate_roster(&backend_id).await;
            self.emit(Signal::GroupJoined, Some(&backend_id)).await;
            self.resync().await;
            // The joined list may lag behind the join itself
            self.with_state(|s| reassert_member(s, local_id, &backend_id, true));
        }
        Ok(())
    }

    pub async fn leave(&self, local_id: LocalId) -> Result<()> {
        let kind = MutationKind::Leave;
        let applied = self
            .optimistic(
                local_id,
                kind,
                |state| {
                    let view = state
                        .group_mut(local_id)
                        .ok_or(MutationError::UnknownGroup(local_id))?;
                    let snapshot = (view.member_count, view.is_member);
                    view.member_count = view.member_count.map(|c| c.saturating_sub(1));
                    state.set_member(local_id, false);
                    Ok(snapshot)
                },
                |backend_id| async move { accepted(kind, self.api.leave_group(&backend_id).await) },
                |state, (count, was_member)| {
                    if let Some(view) = state.group_mut(local_id) {
                        view.member_count = count;
                    }
                    state.set_member(local_id, was_member);
                },
            )
            .await?;

        if let Applied::Remote { backend_id, .. } = applied {
            self.invalidate_roster(&backend_id).await;
            self.emit(Signal::GroupLeft, Some(&backend_id)).await;
            self.resync().await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Remove a group. Remaining members are notified before the delete call.
    pub async fn delete(&self, local_id: LocalId) -> Result<()> {
        let kind = MutationKind::Delete;
        let name = self.name_of(local_id)?;
        let applied = self
            .optimistic(
                local_id,
                kind,
                |state| {
                    let index = state
                        .position(local_id)
                        .ok_or(MutationError::UnknownGroup(local_id))?;
                    Ok((index, state.groups.remove(index)))
                },
                |backend_id| async move {
                    let notice = GroupNotice {
                        title: "Group deleted".to_string(),
                        message: format!("\"{}\" has been deleted by its owner.", name),
                        metadata: json!({ "type": "group_deleted", "groupId": backend_id.as_str() }),
                    };
                    self.notify_best_effort(&backend_id, notice).await;
                    accepted(kind, self.api.delete_group(&backend_id).await)
                },
                |state, (index, view)| {
                    // A resync during the call may already have brought it back
                    if state.position_of_backend(&view.backend_id).is_some() {
                        return;
                    }
                    let index = index.min(state.groups.len());
                    state.groups.insert(index, view);
                },
            )
            .await?;

        match applied {
            Applied::Remote { backend_id, .. } => {
                self.with_state(|s| s.forget(local_id, &backend_id));
                self.emit(Signal::GroupsInvalidate, Some(&backend_id)).await;
                self.resync().await;
            }
            Applied::LocalOnly => {
                self.with_state(|s| s.forget(local_id, &BackendId::local()));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Create a group owned by the viewer.
    ///
    /// If the backend fails or returns nothing usable, a local-only entry is
    /// inserted instead and returned; it is never retried.
    pub async fn create(&self, new_group: &NewGroup) -> Result<GroupView> {
        match self.api.create_group(new_group).await {
            Ok(Some(raw)) if raw.backend_id().is_persisted() => Ok(self.adopt_created(&raw).await),
            Ok(_) => {
                log::error!("create '{}' returned no group; keeping it locally", new_group.name);
                Ok(self.create_local(new_group))
            }
            Err(e) => {
                log::error!("create '{}' failed, keeping it locally: {}", new_group.name, e);
                Ok(self.create_local(new_group))
            }
        }
    }

    async fn adopt_created(&self, raw: &ServerGroup) -> GroupView {
        let viewer = self.viewer.clone();
        let view = self.with_state(|state| {
            let mut view = normalize(raw, Provenance::Server, &mut state.identity, &mut state.owners);
            if let Some(viewer) = viewer.as_deref() {
                if state.owners.creator_of(&view.backend_id).is_none() {
                    state.owners.record(&view.backend_id, viewer);
                }
            }
            view.is_owner = true;
            view.is_member = true;
            state.membership.set(&view.backend_id, true);
            match state.position_of_backend(&view.backend_id) {
                Some(index) => state.groups[index] = view.clone(),
                None => state.groups.insert(0, view.clone()),
            }
            state.in_flight.insert((view.local_id, MutationKind::Create));
            view
        });
        let (local_id, backend_id) = (view.local_id, view.backend_id.clone());
        log::info!("created group {} ({})", backend_id, local_id);

        // Auto-join so the creator shows up in the joined list
        match self.api.join_group(&backend_id).await {
            Ok(true) => {}
            Ok(false) => log::warn!("auto-join of new group {} was rejected", backend_id),
            Err(e) => log::warn!("auto-join of new group {} failed: {}", backend_id, e),
        }
        self.with_state(|s| s.in_flight.remove(&(local_id, MutationKind::Create)));

        self.emit(Signal::GroupCreated, Some(&backend_id)).await;
        self.emit(Signal::GroupsInvalidate, Some(&backend_id)).await;
        self.resync().await;

        self.with_state(|s| {
            reassert_member(s, local_id, &backend_id, true);
            s.group(local_id).cloned()
        })
        .unwrap_or(view)
    }

    fn create_local(&self, new_group: &NewGroup) -> GroupView {
        let raw = ServerGroup {
            name: Some(new_group.name.clone()),
            description: Some(new_group.description.clone()),
            max_members: new_group.max_members,
            is_public: Some(new_group.is_public),
            group_type: new_group.group_type.clone(),
            created_by: self.viewer.clone().map(RawId::Str),
            member_count: Some(1),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };
        self.with_state(|state| {
            let mut view = normalize(&raw, Provenance::Local, &mut state.identity, &mut state.owners);
            view.is_owner = true;
            view.is_member = true;
            state.local_groups.insert(view.local_id);
            state.identity.reserve(view.local_id);
            state.groups.insert(0, view.clone());
            view
        })
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Patch owner-editable fields. On failure the list is resynced before
    /// the error is returned.
    pub async fn update(&self, local_id: LocalId, patch: &GroupPatch) -> Result<()> {
        if patch.is_empty() {
            return self.name_of(local_id).map(|_| ());
        }
        let kind = MutationKind::Update;
        let outcome = self
            .optimistic(
                local_id,
                kind,
                |state| {
                    let view = require_owner(state, local_id)?;
                    let snapshot = (view.name.clone(), view.description.clone(), view.max_members);
                    if let Some(name) = &patch.name {
                        view.name = name.clone();
                    }
                    if let Some(description) = &patch.description {
                        view.description = description.clone();
                    }
                    if let Some(max) = patch.max_members {
                        view.max_members = Some(max);
                    }
                    view.updated_at = Some(chrono::Utc::now());
                    Ok(snapshot)
                },
                |backend_id| async move {
                    self.api
                        .update_group(&backend_id, patch)
                        .await
                        .map_err(MutationError::from)
                },
                |state, (name, description, max_members)| {
                    if let Some(view) = state.group_mut(local_id) {
                        view.name = name;
                        view.description = description;
                        view.max_members = max_members;
                    }
                },
            )
            .await;

        let applied = match outcome {
            Ok(applied) => applied,
            Err(e) if e.is_remote() => {
                self.resync().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if let Applied::Remote { backend_id, value } = applied {
            let notice = GroupNotice {
                title: "Group updated".to_string(),
                message: format!("\"{}\" was updated by its owner.", value.display_name()),
                metadata: json!({ "type": "group_updated", "groupId": backend_id.as_str() }),
            };
            self.notify_best_effort(&backend_id, notice).await;
            self.resync().await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Invites
    // -----------------------------------------------------------------------

    /// Accept an invite. Backends without an accept endpoint get a plain join.
    ///
    /// Either way the viewer ends up a member, so the optimistic step and the
    /// follow-up match `join`. The cleared invite flag is not rolled back.
    pub async fn accept_invite(&self, local_id: LocalId) -> Result<()> {
        let kind = MutationKind::AcceptInvite;
        let applied = self
            .optimistic(
                local_id,
                kind,
                |state| {
                    let view = state
                        .group_mut(local_id)
                        .ok_or(MutationError::UnknownGroup(local_id))?;
                    let snapshot = (view.member_count, view.is_member);
                    view.invited_hint = Some(false);
                    if !view.is_member {
                        view.member_count = view.member_count.map(|c| c.saturating_add(1));
                    }
                    state.set_member(local_id, true);
                    Ok(snapshot)
                },
                |backend_id| async move {
                    match self.api.accept_invite(&backend_id).await {
                        Err(ApiError::Unsupported) => {
                            log::debug!("accept_invite unsupported, joining {} instead", backend_id);
                            accepted(kind, self.api.join_group(&backend_id).await)
                        }
                        answer => accepted(kind, answer),
                    }
                },
                |state, (count, was_member)| {
                    if let Some(view) = state.group_mut(local_id) {
                        view.member_count = count;
                    }
                    state.set_member(local_id, was_member);
                },
            )
            .await?;

        if let Applied::Remote { backend_id, .. } = applied {
            self.invalidate_roster(&backend_id).await;
            self.emit(Signal::GroupJoined, Some(&backend_id)).await;
            self.resync().await;
            self.with_state(|s| reassert_member(s, local_id, &backend_id, true));
            self.emit(Signal::InvitesChanged, Some(&backend_id)).await;
        }
        Ok(())
    }

    /// Decline an invite. Backends without a decline endpoint only get the
    /// local flag cleared.
    pub async fn decline_invite(&self, local_id: LocalId) -> Result<()> {
        let kind = MutationKind::DeclineInvite;
        let applied = self
            .optimistic(
                local_id,
                kind,
                |state| {
                    if let Some(view) = state.group_mut(local_id) {
                        view.invited_hint = Some(false);
                    }
                    Ok(())
                },
                |backend_id| async move {
                    match self.api.decline_invite(&backend_id).await {
                        Err(ApiError::Unsupported) => {
                            log::debug!("decline_invite unsupported, clearing {} locally", backend_id);
                            Ok(false)
                        }
                        answer => accepted(kind, answer).map(|_| true),
                    }
                },
                |_, ()| {},
            )
            .await?;

        if let Applied::Remote { backend_id, value: server_applied } = applied {
            // A local-only clear would be undone by refetching the catalog
            if server_applied {
                self.resync().await;
            }
            self.emit(Signal::InvitesChanged, Some(&backend_id)).await;
        }
        Ok(())
    }

    /// Invite users to a group the viewer owns. Each invitee also gets a
    /// notification (best effort).
    pub async fn invite_members(&self, local_id: LocalId, user_ids: &[String]) -> Result<()> {
        let mut invitees: Vec<String> = Vec::with_capacity(user_ids.len());
        for id in user_ids.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if !invitees.iter().any(|existing| existing == id) {
                invitees.push(id.to_string());
            }
        }
        if invitees.len() > MAX_INVITEES_PER_CALL {
            return Err(MutationError::TooManyInvitees {
                count: invitees.len(),
                max: MAX_INVITEES_PER_CALL,
            });
        }
        let name = self.name_of(local_id)?;
        if invitees.is_empty() {
            return Ok(());
        }

        let kind = MutationKind::Invite;
        let batch = &invitees;
        let applied = self
            .optimistic(
                local_id,
                kind,
                |state| require_owner(state, local_id).map(|_| ()),
                |backend_id| async move {
                    accepted(kind, self.api.invite_to_group(&backend_id, batch).await)
                },
                |_, ()| {},
            )
            .await?;

        if let Applied::Remote { backend_id, .. } = applied {
            for user_id in &invitees {
                let notification = NotificationPayload {
                    user_id: user_id.clone(),
                    title: "Group invitation".to_string(),
                    message: format!("You have been invited to join \"{}\".", name),
                    metadata: json!({ "type": "group_invite", "groupId": backend_id.as_str() }),
                };
                match self.api.create_notification(&notification).await {
                    Ok(true) => {}
                    Ok(false) => log::warn!("invite notification for {} was rejected", user_id),
                    Err(e) => log::warn!("invite notification for {} failed: {}", user_id, e),
                }
            }
            self.emit(Signal::InvitesChanged, Some(&backend_id)).await;
            // Failure is logged inside; the cache keeps its previous value
            let _ = self.load_pending_invites(local_id).await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Schedule a study session for a group the viewer belongs to.
    ///
    /// Returns `None` for local-only groups, which have nowhere to store it.
    pub async fn schedule_session(
        &self,
        local_id: LocalId,
        session: &NewSession,
    ) -> Result<Option<SessionRecord>> {
        let kind = MutationKind::ScheduleSession;
        let applied = self
            .optimistic(
                local_id,
                kind,
                |state| {
                    let view = state
                        .group(local_id)
                        .ok_or(MutationError::UnknownGroup(local_id))?;
                    if view.is_member || view.is_owner {
                        Ok(())
                    } else {
                        Err(MutationError::NotMember)
                    }
                },
                |backend_id| async move {
                    let request = NewSession {
                        group_id: Some(backend_id),
                        ..session.clone()
                    };
                    self.api
                        .create_session(&request)
                        .await
                        .map_err(MutationError::from)
                },
                |_, ()| {},
            )
            .await?;

        let (backend_id, record) = match applied {
            Applied::Remote { backend_id, value } => (backend_id, value),
            Applied::LocalOnly => return Ok(None),
        };

        match self.api.schedule_session_reminder(&record.id).await {
            Ok(true) => {}
            Ok(false) => log::warn!("reminder for session {} was rejected", record.id),
            Err(e) => log::warn!("reminder for session {} failed: {}", record.id, e),
        }
        let notice = GroupNotice {
            title: "New session scheduled".to_string(),
            message: format!("\"{}\" starts at {}.", record.title, record.starts_at),
            metadata: json!({
                "type": "session_created",
                "sessionId": record.id,
                "groupId": backend_id.as_str(),
            }),
        };
        self.notify_best_effort(&backend_id, notice).await;

        self.emit(Signal::SessionCreated, Some(&backend_id)).await;
        self.emit(Signal::SessionsInvalidate, Some(&backend_id)).await;
        Ok(Some(record))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
