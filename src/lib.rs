//! # Shield Groups
//!
//! **Client-side group membership and identity reconciliation.**
//!
//! Keeps a locally rendered list of study groups consistent with an
//! authoritative backend while tolerating two identifier spaces, partial
//! failures, and invalidation signals arriving from the same window and from
//! other tabs. Mutations apply optimistically and roll back when the backend
//! says no.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shield_groups::{GroupSync, InvalidationBus, MemoryGroupApi, SyncConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(MemoryGroupApi::new("user-1"));
//! let config = SyncConfig::default();
//! let bus = InvalidationBus::from_config(&config);
//! let sync = Arc::new(GroupSync::new(api, bus, Some("user-1"), config)?);
//!
//! let _listener = sync.listen().await?;
//! for group in sync.resync().await {
//!     println!("{} {}", group.name, group.capacity_label());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`groups`] | Identity mapper, ownership resolver, membership store, roster cache, engine and mutations |
//! | [`bus`] | Invalidation signals over same-window and cross-tab transports, resync listener |
//! | [`api`] | Data-access trait the host implements, plus an in-memory backend |
//! | [`config`] | `SyncConfig` |
//! | [`limits`] | Cache and fan-out guardrails |

// Crate-level lint configuration: suppress stylistic warnings that don't affect correctness.
#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::too_many_arguments,
    clippy::type_complexity,
    unused_doc_comments
)]

// ── Public modules ──────────────────────────────────────────────────────────

/// Data-access contract and the in-memory backend.
pub mod api;

/// Invalidation signals, transports and the resync listener.
pub mod bus;

/// Engine configuration.
pub mod config;

/// Group identity, ownership, membership, rosters and the reconciliation engine.
pub mod groups;

/// Guardrail constants.
pub mod limits;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use api::{ApiError, GroupApi, MemoryGroupApi};

pub use bus::{
    BroadcastHub, CrossTabChannel, InvalidationBus, InvalidationListener, ListenerHandle, Signal,
    SignalEnvelope, WindowBus,
};

pub use config::{ConfigError, SyncConfig};

pub use groups::{
    BackendId, DatasetMode, GroupSync, GroupView, LocalId, MutationError, MutationKind,
    RosterStatus,
};

// ── Library metadata ────────────────────────────────────────────────────────

/// Shield Groups version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
pub fn version() -> &'static str {
    VERSION
}

// ── Tests ───────────────────────────────────────────────────────────────────
