//! Data-access contract the engine consumes.
//!
//! The crate never performs I/O itself: the application implements
//! [`GroupApi`] on top of its HTTP/WebSocket client (auth headers, retries and
//! timeouts live there). Every call returns either the requested data or a
//! success flag; any error is treated by the engine as a failed call.
//!
//! [`memory::MemoryGroupApi`] is an in-process backend with failure injection
//! for tests and offline development.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::groups::ids::BackendId;
use crate::groups::model::{ServerGroup, ServerMember};

pub use memory::MemoryGroupApi;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network unreachable: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Response decode failed: {0}")]
    Decode(String),

    #[error("Endpoint not available")]
    Unsupported,
}

impl ApiError {
    /// Transport-level failure (backend unreachable), as opposed to a server answer.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub max_members: Option<u32>,
    pub is_public: bool,
    pub group_type: Option<String>,
}

/// Owner-editable fields. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_members: Option<u32>,
}

impl GroupPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.max_members.is_none()
    }
}

/// Message fanned out to every member of a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupNotice {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Notification addressed to a single user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvite {
    pub user_id: String,
    #[serde(default)]
    pub invited_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// RFC 3339 start time.
    pub starts_at: String,
    pub duration_minutes: u32,
    /// Filled in by the engine from the target group.
    #[serde(default)]
    pub group_id: Option<BackendId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub starts_at: String,
    #[serde(default)]
    pub group_id: Option<BackendId>,
}

// ---------------------------------------------------------------------------
// GroupApi
// ---------------------------------------------------------------------------

/// Backend operations the engine depends on.
///
/// `accept_invite` / `decline_invite` are optional capabilities: the default
/// implementations report `ApiError::Unsupported` and the engine degrades to
/// the nearest local equivalent.
#[async_trait]
pub trait GroupApi: Send + Sync {
    /// Every group the viewer can see.
    async fn list_all_groups(&self) -> Result<Vec<ServerGroup>>;

    /// The subset the viewer has joined.
    async fn list_my_groups(&self) -> Result<Vec<ServerGroup>>;

    /// Create a group. `Ok(None)` means the server accepted but returned no entity.
    async fn create_group(&self, group: &NewGroup) -> Result<Option<ServerGroup>>;

    async fn update_group(&self, id: &BackendId, patch: &GroupPatch) -> Result<ServerGroup>;

    async fn delete_group(&self, id: &BackendId) -> Result<bool>;

    async fn join_group(&self, id: &BackendId) -> Result<bool>;

    async fn leave_group(&self, id: &BackendId) -> Result<bool>;

    async fn invite_to_group(&self, id: &BackendId, user_ids: &[String]) -> Result<bool>;

    async fn list_pending_invites(&self, id: &BackendId) -> Result<Vec<PendingInvite>>;

    async fn list_members(&self, id: &BackendId) -> Result<Vec<ServerMember>>;

    async fn notify_group(&self, id: &BackendId, notice: &GroupNotice) -> Result<bool>;

    async fn create_notification(&self, notification: &NotificationPayload) -> Result<bool>;

    async fn create_session(&self, session: &NewSession) -> Result<SessionRecord>;

    async fn schedule_session_reminder(&self, session_id: &str) -> Result<bool>;

    async fn accept_invite(&self, _id: &BackendId) -> Result<bool> {
        Err(ApiError::Unsupported)
    }

    async fn decline_invite(&self, _id: &BackendId) -> Result<bool> {
        Err(ApiError::Unsupported)
    }
}
