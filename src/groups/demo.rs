//! Demo dataset rendered when the catalog cannot be fetched.
//!
//! Demo groups are normalized with `Provenance::Local`, so they never carry a
//! backend id and mutations on them stay local.

use once_cell::sync::Lazy;

use crate::groups::model::{RawId, Role, ServerGroup, ServerMember};

/// Banner shown while demo data is on screen.
pub const DEMO_BANNER: &str =
    "Showing demo data: the group service is unreachable. Changes will not be saved.";

static DEMO_GROUPS: Lazy<Vec<ServerGroup>> = Lazy::new(|| {
    vec![
        demo_group(901, "Calculus Study Circle", "Limits, derivatives and weekly problem sets", 3, 8, "demo-1"),
        demo_group(902, "Organic Chemistry Lab Prep", "Pre-lab walkthroughs before each session", 5, 6, "demo-2"),
        demo_group(903, "Intro to Rust", "Ownership, borrowing and small projects", 2, 10, "demo-3"),
    ]
});

fn demo_group(
    id: u64,
    name: &str,
    description: &str,
    count: u32,
    max: u32,
    creator: &str,
) -> ServerGroup {
    ServerGroup {
        group_id: Some(RawId::Num(id)),
        group_name: Some(name.to_string()),
        description: Some(description.to_string()),
        legacy_max_members: Some(max),
        creator_id: Some(RawId::Str(creator.to_string())),
        legacy_member_count: Some(count),
        legacy_created_at: Some("2024-01-15 09:00:00".to_string()),
        members: Some(vec![ServerMember {
            user_id: Some(RawId::Str(creator.to_string())),
            role: Some(Role::Owner),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// The fixed illustrative catalog.
pub fn demo_groups() -> &'static [ServerGroup] {
    &DEMO_GROUPS
}
