//! Group membership and identity reconciliation.
//!
//! Leaf modules (`ids`, `ownership`, `membership`, `roster`, `model`) are
//! plain data structures with no I/O. `engine` owns them behind
//! [`engine::GroupSync`]; `mutation` adds the optimistic operations on top.

pub mod demo;
pub mod engine;
pub mod ids;
pub mod membership;
pub mod model;
pub mod mutation;
pub mod ownership;
pub mod roster;

pub use engine::{DatasetMode, GroupSync};
pub use ids::{BackendId, IdentityMapper, LocalId};
pub use model::{GroupView, Member, Role, ServerGroup, ServerMember};
pub use mutation::{MutationError, MutationKind};
pub use roster::{RosterError, RosterStatus};
