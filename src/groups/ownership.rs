/// Ownership Resolver and the Owner Record.
///
/// The backend has reported ownership under different shapes depending on the
/// endpoint and where a group came from, so ownership is inferred from a
/// priority-ordered list of signals. The first signal that is present decides.

use std::collections::HashMap;

use crate::groups::ids::BackendId;
use crate::groups::model::GroupView;

// ---------------------------------------------------------------------------
// OwnerRecord
// ---------------------------------------------------------------------------

/// `backend id -> creator id`, refreshed on every normalization pass.
#[derive(Clone, Debug, Default)]
pub struct OwnerRecord {
    creators: HashMap<BackendId, String>,
}

impl OwnerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) the creator of a persisted group.
    pub fn record(&mut self, backend_id: &BackendId, creator_id: &str) {
        let creator = creator_id.trim();
        if !backend_id.is_persisted() || creator.is_empty() {
            return;
        }
        self.creators
            .insert(backend_id.clone(), creator.to_string());
    }

    pub fn creator_of(&self, backend_id: &BackendId) -> Option<&str> {
        self.creators.get(backend_id).map(String::as_str)
    }

    pub fn forget(&mut self, backend_id: &BackendId) {
        self.creators.remove(backend_id);
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Which signal decided ownership. Useful when logging surprising answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipSource {
    Flag,
    OwnerRecord,
    CreatedBy,
    Roster,
    NoViewer,
    NoSignal,
}

/// Whether `viewer_id` controls `group`.
pub fn is_owner(group: &GroupView, owners: &OwnerRecord, viewer_id: Option<&str>) -> bool {
    resolve_owner(group, owners, viewer_id).0
}

/// Evaluate the ownership signals in priority order:
/// 1. explicit owner flag on the normalized group
/// 2. Owner Record for its backend id
/// 3. raw `created_by`
/// 4. inline roster entry for the viewer with role owner/admin
pub fn resolve_owner(
    group: &GroupView,
    owners: &OwnerRecord,
    viewer_id: Option<&str>,
) -> (bool, OwnershipSource) {
    let viewer = match viewer_id.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => return (false, OwnershipSource::NoViewer),
    };

    if let Some(flag) = group.owner_hint {
        return (flag, OwnershipSource::Flag);
    }

    if let Some(creator) = owners.creator_of(&group.backend_id) {
        return (creator == viewer, OwnershipSource::OwnerRecord);
    }

    if let Some(creator) = group.created_by.as_deref().map(str::trim) {
        if !creator.is_empty() {
            return (creator == viewer, OwnershipSource::CreatedBy);
        }
    }

    if !group.members.is_empty() {
        let controls = group
            .members
            .iter()
            .any(|m| m.user_id == viewer && m.role.controls_group());
        return (controls, OwnershipSource::Roster);
    }

    (false, OwnershipSource::NoSignal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::ids::{IdentityMapper, LocalId};
    use crate::groups::model::{Member, Role};

    fn view(backend: &str) -> GroupView {
        GroupView {
            local_id: LocalId(1),
            backend_id: BackendId::new(backend),
            name: "G".into(),
            description: String::new(),
            max_members: None,
            group_type: None,
            is_public: true,
            is_active: true,
            created_at: None,
            updated_at: None,
            member_count: None,
            owner_hint: None,
            invited_hint: None,
            created_by: None,
            members: vec![],
            is_owner: false,
            is_member: false,
        }
    }

    fn member(user: &str, role: Role) -> Member {
        Member {
            user_id: user.into(),
            role,
            name: None,
            email: None,
            joined_at: None,
        }
    }

    #[test]
    fn test_no_viewer_is_never_owner() {
        let mut g = view("g");
        g.owner_hint = Some(true);
        let owners = OwnerRecord::new();
        assert!(!is_owner(&g, &owners, None));
        assert!(!is_owner(&g, &owners, Some("  ")));
    }

    #[test]
    fn test_flag_wins() {
        let mut g = view("g");
        g.owner_hint = Some(false);
        let mut owners = OwnerRecord::new();
        owners.record(&g.backend_id, "u1");
        assert_eq!(
            resolve_owner(&g, &owners, Some("u1")),
            (false, OwnershipSource::Flag)
        );
    }

    #[test]
    fn test_owner_record_before_created_by() {
        let mut g = view("g");
        g.created_by = Some("u2".into());
        let mut owners = OwnerRecord::new();
        owners.record(&g.backend_id, "u1");
        assert_eq!(
            resolve_owner(&g, &owners, Some("u1")),
            (true, OwnershipSource::OwnerRecord)
        );
    }

    #[test]
    fn test_created_by_fallback() {
        let mut g = view("");
        g.created_by = Some("7".into());
        let owners = OwnerRecord::new();
        assert!(is_owner(&g, &owners, Some("7")));
        assert!(!is_owner(&g, &owners, Some("8")));
    }

    #[test]
    fn test_roster_scan() {
        let mut g = view("g");
        g.members = vec![member("u1", Role::Member), member("u2", Role::Admin)];
        let owners = OwnerRecord::new();
        assert_eq!(
            resolve_owner(&g, &owners, Some("u2")),
            (true, OwnershipSource::Roster)
        );
        assert!(!is_owner(&g, &owners, Some("u1")));
    }

    #[test]
    fn test_no_signal() {
        let g = view("g");
        assert_eq!(
            resolve_owner(&g, &OwnerRecord::new(), Some("u1")),
            (false, OwnershipSource::NoSignal)
        );
    }

    #[test]
    fn test_record_ignores_local_and_blank() {
        let mut owners = OwnerRecord::new();
        owners.record(&BackendId::local(), "u1");
        owners.record(&BackendId::new("g"), " ");
        assert!(owners.is_empty());
        owners.record(&BackendId::new("g"), "u1");
        owners.forget(&BackendId::new("g"));
        assert!(owners.is_empty());
    }

    #[test]
    fn test_numeric_and_string_creator_agree() {
        let raw: crate::groups::model::ServerGroup =
            serde_json::from_str(r#"{"group_id": 4, "creator_id": 1}"#).unwrap();
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let g = crate::groups::model::normalize(
            &raw,
            crate::groups::model::Provenance::Server,
            &mut identity,
            &mut owners,
        );
        assert!(is_owner(&g, &owners, Some("1")));
    }
}
