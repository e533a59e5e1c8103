/// Server payload shapes and the normalized `GroupView`.
///
/// The backend returns groups in two shapes:
/// - "rich": `id`, `name`, `maxMembers`, `createdBy`, `members[]`, timestamps
/// - "legacy/local": `group_id`, `group_name`, `max_members`, `creator_id`, `member_count`
///
/// Both deserialize into `ServerGroup` (every field optional, both spellings
/// kept side by side) and `normalize` folds them into one `GroupView`. Where a
/// field exists in both shapes the rich spelling wins.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::groups::ids::{BackendId, IdentityMapper, LocalId};
use crate::groups::ownership::OwnerRecord;

// ---------------------------------------------------------------------------
// Raw payload types
// ---------------------------------------------------------------------------

/// An identifier the backend may send as a JSON number or string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Num(u64),
    Str(String),
}

impl RawId {
    pub fn as_native(&self) -> Option<u64> {
        match self {
            RawId::Num(n) => Some(*n),
            RawId::Str(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, RawId::Str(s) if s.trim().is_empty())
    }
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Num(n) => write!(f, "{}", n),
            RawId::Str(s) => f.write_str(s.trim()),
        }
    }
}

/// Member role as reported in inline rosters.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    Member,
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Owner and admin both control the group.
    pub fn controls_group(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

/// Roster entry as the server sends it (either shape).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMember {
    #[serde(default)]
    pub user_id: Option<RawId>,
    #[serde(default, rename = "user_id")]
    pub legacy_user_id: Option<RawId>,
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub joined_at: Option<String>,
}

/// Group as the server sends it (either shape).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGroup {
    // rich
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_members: Option<u32>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub group_type: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub created_by: Option<RawId>,
    #[serde(default)]
    pub members: Option<Vec<ServerMember>>,
    #[serde(default)]
    pub member_count: Option<u32>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub is_owner: Option<bool>,
    #[serde(default)]
    pub is_invited: Option<bool>,

    // legacy/local
    #[serde(default, rename = "group_id")]
    pub group_id: Option<RawId>,
    #[serde(default, rename = "group_name")]
    pub group_name: Option<String>,
    #[serde(default, rename = "max_members")]
    pub legacy_max_members: Option<u32>,
    #[serde(default, rename = "creator_id")]
    pub creator_id: Option<RawId>,
    #[serde(default, rename = "member_count")]
    pub legacy_member_count: Option<u32>,
    #[serde(default, rename = "created_at")]
    pub legacy_created_at: Option<String>,
    #[serde(default, rename = "updated_at")]
    pub legacy_updated_at: Option<String>,
}

impl ServerGroup {
    /// Canonical backend id: string `id`, numeric `id`, then `group_id` in either form.
    pub fn backend_id(&self) -> BackendId {
        [&self.id, &self.group_id]
            .into_iter()
            .flatten()
            .find(|raw| !raw.is_blank())
            .map(|raw| BackendId::new(raw.to_string()))
            .unwrap_or_else(BackendId::local)
    }

    /// Numeric id carried by the payload, if any.
    pub fn native_id(&self) -> Option<u64> {
        self.id
            .as_ref()
            .and_then(RawId::as_native)
            .or_else(|| self.group_id.as_ref().and_then(RawId::as_native))
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.group_name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Untitled group")
            .to_string()
    }

    pub fn creator(&self) -> Option<String> {
        self.created_by
            .as_ref()
            .or(self.creator_id.as_ref())
            .filter(|raw| !raw.is_blank())
            .map(|raw| raw.to_string())
    }
}

// ---------------------------------------------------------------------------
// Normalized types
// ---------------------------------------------------------------------------

/// Normalized roster entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl Member {
    /// Normalize a server member; entries with no user id at all are dropped.
    pub fn from_server(raw: &ServerMember) -> Option<Self> {
        let user_id = raw
            .user_id
            .as_ref()
            .or(raw.legacy_user_id.as_ref())
            .or(raw.id.as_ref())
            .filter(|r| !r.is_blank())?
            .to_string();
        Some(Member {
            user_id,
            role: raw.role.unwrap_or_default(),
            name: raw.name.clone(),
            email: raw.email.clone(),
            joined_at: raw.joined_at.as_deref().and_then(parse_timestamp),
        })
    }
}

/// The single internal representation of a group the view renders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub local_id: LocalId,
    pub backend_id: BackendId,
    pub name: String,
    pub description: String,
    pub max_members: Option<u32>,
    pub group_type: Option<String>,
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub member_count: Option<u32>,
    pub owner_hint: Option<bool>,
    pub invited_hint: Option<bool>,
    pub created_by: Option<String>,
    pub members: Vec<Member>,
    /// Derived: the current viewer controls this group.
    pub is_owner: bool,
    /// Derived: the current viewer belongs to this group.
    pub is_member: bool,
}

impl GroupView {
    pub fn is_local_only(&self) -> bool {
        !self.backend_id.is_persisted()
    }

    /// True when an inline roster lists `viewer_id`.
    pub fn lists_member(&self, viewer_id: &str) -> bool {
        let viewer = viewer_id.trim();
        !viewer.is_empty() && self.members.iter().any(|m| m.user_id == viewer)
    }

    /// `count/max` as a view would print it.
    pub fn capacity_label(&self) -> String {
        let count = self.member_count.unwrap_or(0);
        match self.max_members {
            Some(max) => format!("{}/{}", count, max),
            None => count.to_string(),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!((self.member_count, self.max_members), (Some(c), Some(m)) if c >= m)
    }
}

/// Where a payload came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Authoritative backend response.
    Server,
    /// Client-side only (demo data, failed-create fallback). Never gets a backend id.
    Local,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Fold a server payload into a `GroupView`.
///
/// Side effects: registers the identity mapping and refreshes the owner record
/// for persisted groups. `is_owner` / `is_member` are left false; the engine
/// derives them once the viewer is known.
pub fn normalize(
    raw: &ServerGroup,
    provenance: Provenance,
    identity: &mut IdentityMapper,
    owners: &mut OwnerRecord,
) -> GroupView {
    let name = raw.display_name();
    let created_at = raw
        .created_at
        .as_deref()
        .or(raw.legacy_created_at.as_deref())
        .and_then(parse_timestamp);
    let updated_at = raw
        .updated_at
        .as_deref()
        .or(raw.legacy_updated_at.as_deref())
        .and_then(parse_timestamp);

    let backend_id = match provenance {
        Provenance::Server => raw.backend_id(),
        Provenance::Local => BackendId::local(),
    };

    let local_id = if backend_id.is_persisted() {
        identity.resolve(&backend_id, raw.native_id())
    } else {
        match raw.native_id() {
            Some(native) => LocalId::from_native(native),
            None => identity.local_only(
                &name,
                created_at.map(|t| t.timestamp_millis()).unwrap_or_default(),
            ),
        }
    };

    let created_by = raw.creator();
    if backend_id.is_persisted() {
        if let Some(creator) = &created_by {
            owners.record(&backend_id, creator);
        }
    }

    let members: Vec<Member> = raw
        .members
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(Member::from_server)
        .collect();

    let member_count = raw
        .member_count
        .or(raw.legacy_member_count)
        .or_else(|| raw.members.as_ref().map(|m| m.len() as u32));

    GroupView {
        local_id,
        backend_id,
        name,
        description: raw.description.clone().unwrap_or_default(),
        max_members: raw.max_members.or(raw.legacy_max_members),
        group_type: raw.group_type.clone(),
        is_public: raw.is_public.unwrap_or(true),
        is_active: raw.is_active.unwrap_or(true),
        created_at,
        updated_at,
        member_count,
        owner_hint: raw.is_owner,
        invited_hint: raw.is_invited,
        created_by,
        members,
        is_owner: false,
        is_member: false,
    }
}

/// Parse RFC 3339 first, then the naive `YYYY-MM-DD HH:MM:SS` legacy rows use.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ServerGroup {
        serde_json::from_str(json).unwrap()
    }

    fn norm(raw: &ServerGroup, identity: &mut IdentityMapper, owners: &mut OwnerRecord) -> GroupView {
        normalize(raw, Provenance::Server, identity, owners)
    }

    #[test]
    fn test_rich_shape() {
        let raw = parse(
            r#"{
                "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
                "name": "Linear Algebra",
                "description": "Weekly problem sets",
                "maxMembers": 8,
                "isPublic": true,
                "createdBy": "u-1",
                "members": [
                    {"userId": "u-1", "role": "owner", "name": "Ada"},
                    {"userId": "u-2", "role": "member"}
                ],
                "createdAt": "2024-03-01T10:00:00Z"
            }"#,
        );
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let view = norm(&raw, &mut identity, &mut owners);

        assert_eq!(view.backend_id.as_str(), "7c9e6679-7425-40de-944b-e07fc1f90ae7");
        assert_eq!(view.name, "Linear Algebra");
        assert_eq!(view.max_members, Some(8));
        assert_eq!(view.member_count, Some(2));
        assert_eq!(view.created_by.as_deref(), Some("u-1"));
        assert_eq!(view.members[0].role, Role::Owner);
        assert!(view.created_at.is_some());
        assert_eq!(owners.creator_of(&view.backend_id), Some("u-1"));
        assert_eq!(identity.backend_for(view.local_id), Some(&view.backend_id));
    }

    #[test]
    fn test_legacy_shape() {
        let raw = parse(
            r#"{
                "group_id": 12,
                "group_name": "Chem Lab",
                "max_members": 5,
                "creator_id": 2,
                "member_count": 2,
                "created_at": "2023-09-14 08:30:00"
            }"#,
        );
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let view = norm(&raw, &mut identity, &mut owners);

        assert_eq!(view.local_id, LocalId(12));
        assert_eq!(view.backend_id.as_str(), "12");
        assert_eq!(view.name, "Chem Lab");
        assert_eq!(view.max_members, Some(5));
        assert_eq!(view.member_count, Some(2));
        assert_eq!(view.created_by.as_deref(), Some("2"));
        assert!(view.created_at.is_some());
    }

    #[test]
    fn test_rich_fields_win_over_legacy() {
        let raw = parse(r#"{"id": "g1", "name": "Rich", "group_name": "Legacy", "maxMembers": 10, "max_members": 3}"#);
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let view = norm(&raw, &mut identity, &mut owners);
        assert_eq!(view.name, "Rich");
        assert_eq!(view.max_members, Some(10));
    }

    #[test]
    fn test_local_provenance_has_no_backend_id() {
        let raw = parse(r#"{"group_id": 3, "group_name": "Demo"}"#);
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let view = normalize(&raw, Provenance::Local, &mut identity, &mut owners);
        assert!(view.is_local_only());
        assert_eq!(view.local_id, LocalId(3));
        assert!(identity.is_empty());
    }

    #[test]
    fn test_no_identifier_hashes_content() {
        let raw = parse(r#"{"name": "Scratch", "createdAt": "2024-01-01T00:00:00Z"}"#);
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let a = norm(&raw, &mut identity, &mut owners);
        let b = norm(&raw, &mut identity, &mut owners);
        assert!(a.is_local_only());
        assert_ne!(a.local_id.0, 0);
        assert_eq!(a.local_id, b.local_id);
    }

    #[test]
    fn test_same_backend_id_same_local_id_across_shapes() {
        let rich = parse(r#"{"id": "abc", "name": "X"}"#);
        let legacy = parse(r#"{"group_id": "abc", "group_name": "X"}"#);
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let a = norm(&rich, &mut identity, &mut owners);
        let b = norm(&legacy, &mut identity, &mut owners);
        let c = norm(&rich, &mut identity, &mut owners);
        assert_eq!(a.local_id, b.local_id);
        assert_eq!(a.local_id, c.local_id);
        assert_eq!(identity.len(), 1);
    }

    #[test]
    fn test_missing_creator_keeps_owner_record() {
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        norm(&parse(r#"{"id": "g", "createdBy": "u-9"}"#), &mut identity, &mut owners);
        norm(&parse(r#"{"id": "g"}"#), &mut identity, &mut owners);
        assert_eq!(owners.creator_of(&BackendId::new("g")), Some("u-9"));
    }

    #[test]
    fn test_unknown_role_and_idless_members() {
        let raw = parse(
            r#"{"id": "g", "members": [{"userId": 4, "role": "moderator"}, {"name": "ghost"}]}"#,
        );
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let view = norm(&raw, &mut identity, &mut owners);
        assert_eq!(view.members.len(), 1);
        assert_eq!(view.members[0].user_id, "4");
        assert_eq!(view.members[0].role, Role::Unknown);
        // The count still reflects what the server listed
        assert_eq!(view.member_count, Some(2));
    }

    #[test]
    fn test_blank_name_falls_back() {
        let raw = parse(r#"{"id": "g", "name": "   "}"#);
        assert_eq!(raw.display_name(), "Untitled group");
    }

    #[test]
    fn test_capacity_label() {
        let mut identity = IdentityMapper::new();
        let mut owners = OwnerRecord::new();
        let view = norm(&parse(r#"{"id": "g", "memberCount": 2, "maxMembers": 5}"#), &mut identity, &mut owners);
        assert_eq!(view.capacity_label(), "2/5");
        assert!(!view.is_full());
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-03-01T10:00:00+02:00").is_some());
        assert!(parse_timestamp("2024-03-01 10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
