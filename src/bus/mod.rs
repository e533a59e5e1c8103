//! Invalidation bus.
//!
//! Two transports carry the same signal vocabulary:
//! - [`window::WindowBus`]: same-window pub/sub (tokio broadcast)
//! - [`cross_tab::CrossTabChannel`]: cross-tab broadcast over a shared hub,
//!   CBOR-encoded on the wire; a tab never hears its own messages
//!
//! [`InvalidationBus`] publishes on both; [`listener::InvalidationListener`]
//! subscribes to both and funnels every relevant signal into one resync. A
//! signal is only ever a trigger to refetch: its payload is never applied.

pub mod cross_tab;
pub mod listener;
pub mod window;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::groups::ids::BackendId;

pub use cross_tab::{BroadcastHub, CrossTabChannel};
pub use listener::{InvalidationListener, ListenerHandle, ResyncTarget};
pub use window::WindowBus;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum BusError {
    #[error("CBOR encoding failed: {0}")]
    CborEncode(String),

    #[error("CBOR decoding failed: {0}")]
    CborDecode(String),

    #[error("Transport closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Signal vocabulary
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    GroupsInvalidate,
    GroupCreated,
    GroupJoined,
    GroupLeft,
    InvitesChanged,
    SessionCreated,
    SessionsInvalidate,
}

impl Signal {
    /// Event name shared with the rest of the application.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::GroupsInvalidate => "groups:invalidate",
            Signal::GroupCreated => "group:created",
            Signal::GroupJoined => "group:joined",
            Signal::GroupLeft => "group:left",
            Signal::InvitesChanged => "group.invites.changed",
            Signal::SessionCreated => "session:created",
            Signal::SessionsInvalidate => "sessions:invalidate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "groups:invalidate" => Some(Signal::GroupsInvalidate),
            "group:created" => Some(Signal::GroupCreated),
            "group:joined" => Some(Signal::GroupJoined),
            "group:left" => Some(Signal::GroupLeft),
            "group.invites.changed" => Some(Signal::InvitesChanged),
            "session:created" => Some(Signal::SessionCreated),
            "sessions:invalidate" => Some(Signal::SessionsInvalidate),
            _ => None,
        }
    }

    /// Signals the group list resyncs on. Invite and session-list signals are
    /// for other views.
    pub fn invalidates_groups(&self) -> bool {
        matches!(
            self,
            Signal::GroupsInvalidate
                | Signal::GroupCreated
                | Signal::GroupJoined
                | Signal::GroupLeft
                | Signal::SessionCreated
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SignalEnvelope
// ---------------------------------------------------------------------------

/// One emitted signal plus the bookkeeping needed to de-duplicate it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignalEnvelope {
    /// Unique per emission; the listener de-duplicates on it.
    pub id: Uuid,
    pub signal: Signal,
    /// Group the signal is about, informational only.
    pub group: Option<BackendId>,
    /// Tab that emitted the signal.
    pub origin: Uuid,
    /// Component inside the tab that emitted it.
    pub source: Uuid,
    pub emitted_at_ms: i64,
}

impl SignalEnvelope {
    pub fn new(signal: Signal, group: Option<BackendId>, origin: Uuid, source: Uuid) -> Self {
        SignalEnvelope {
            id: Uuid::new_v4(),
            signal,
            group,
            origin,
            source,
            emitted_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Stand-in for signals a lagging subscriber missed: forces a full resync.
    pub fn lagged() -> Self {
        Self::new(Signal::GroupsInvalidate, None, Uuid::nil(), Uuid::nil())
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, BusError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| BusError::CborEncode(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, BusError> {
        ciborium::from_reader(bytes).map_err(|e| BusError::CborDecode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Stream of delivered envelopes.
pub type SignalStream = Pin<Box<dyn Stream<Item = SignalEnvelope> + Send>>;

#[async_trait]
pub trait SignalTransport: Send + Sync {
    /// Fire-and-forget: no subscribers is not an error.
    async fn publish(&self, envelope: SignalEnvelope) -> Result<(), BusError>;

    /// Stream of envelopes published after this call. Dropping it unsubscribes.
    async fn subscribe(&self) -> Result<SignalStream, BusError>;
}

// ---------------------------------------------------------------------------
// InvalidationBus
// ---------------------------------------------------------------------------

/// Both transports of one tab.
#[derive(Clone)]
pub struct InvalidationBus {
    tab_id: Uuid,
    window: Arc<dyn SignalTransport>,
    cross_tab: Arc<dyn SignalTransport>,
}

impl InvalidationBus {
    pub fn new(window: WindowBus, cross_tab: CrossTabChannel) -> Self {
        InvalidationBus {
            tab_id: cross_tab.tab_id(),
            window: Arc::new(window),
            cross_tab: Arc::new(cross_tab),
        }
    }

    /// A single tab with its own private hub.
    pub fn standalone(capacity: usize) -> Self {
        let hub = BroadcastHub::new(capacity);
        Self::new(WindowBus::new(capacity), CrossTabChannel::connect(&hub))
    }

    /// A standalone bus sized by `config.channel_capacity`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::standalone(config.channel_capacity)
    }

    /// A bus for one more tab on an existing hub, sized by `config`.
    pub fn attach(hub: &BroadcastHub, config: &SyncConfig) -> Self {
        Self::new(WindowBus::new(config.channel_capacity), CrossTabChannel::connect(hub))
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    /// Publish `signal` on both transports. Failures are logged, never returned.
    pub async fn emit(&self, source: Uuid, signal: Signal, group: Option<&BackendId>) {
        let envelope = SignalEnvelope::new(signal, group.cloned(), self.tab_id, source);
        log::debug!("emit {} ({})", signal, envelope.id);
        if let Err(e) = self.window.publish(envelope.clone()).await {
            log::warn!("window publish of {} failed: {}", signal, e);
        }
        if let Err(e) = self.cross_tab.publish(envelope).await {
            log::warn!("cross-tab publish of {} failed: {}", signal, e);
        }
    }

    /// Subscribe to the window transport.
    pub async fn subscribe_window(&self) -> Result<SignalStream, BusError> {
        self.window.subscribe().await
    }

    /// Subscribe to the cross-tab transport.
    pub async fn subscribe_cross_tab(&self) -> Result<SignalStream, BusError> {
        self.cross_tab.subscribe().await
    }
}
