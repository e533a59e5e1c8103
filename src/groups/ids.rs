/// Identity types and the Identity Mapper.
///
/// - `BackendId`: canonical server-assigned group identifier (empty = not persisted)
/// - `LocalId`: session-local numeric key used for rendering and in-flight tracking
/// - `IdentityMapper`: memoized, collision-checked two-way association

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::limits::LOCAL_ID_MASK;

// ---------------------------------------------------------------------------
// BackendId
// ---------------------------------------------------------------------------

/// Canonical group identifier as the backend spells it.
///
/// The empty string marks a group that exists only on this client.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        BackendId(id.into().trim().to_string())
    }

    /// The "not yet persisted" id.
    pub fn local() -> Self {
        BackendId(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True once the server has assigned an id.
    pub fn is_persisted(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Debug for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_persisted() {
            write!(f, "BackendId({})", self.0)
        } else {
            write!(f, "BackendId(<local>)")
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(s: &str) -> Self {
        BackendId::new(s)
    }
}

// ---------------------------------------------------------------------------
// LocalId
// ---------------------------------------------------------------------------

/// Session-local numeric group key. Never sent to the server.
///
/// Always non-zero and inside the JS safe-integer range so a web view can use
/// it as a render key without precision loss.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub u64);

impl LocalId {
    /// Deterministic id for a backend identifier: BLAKE3(id)[0..8] masked to 53 bits.
    pub fn from_backend(backend_id: &BackendId) -> Self {
        Self::from_hash(&[b"SG-BACKEND", backend_id.as_str().as_bytes()])
    }

    /// Content-hash id for a group with no backend identifier (name + timestamp).
    pub fn from_content(name: &str, timestamp_ms: i64) -> Self {
        Self::from_hash(&[
            b"SG-LOCAL",
            name.as_bytes(),
            &timestamp_ms.to_le_bytes(),
        ])
    }

    /// Use a numeric id the server already assigned.
    pub fn from_native(native: u64) -> Self {
        Self::nonzero(native & LOCAL_ID_MASK)
    }

    fn from_hash(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        let hash = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&hash.as_bytes()[..8]);
        Self::nonzero(u64::from_le_bytes(word) & LOCAL_ID_MASK)
    }

    fn nonzero(raw: u64) -> Self {
        if raw == 0 {
            LocalId(1)
        } else {
            LocalId(raw)
        }
    }

    /// Next candidate slot when probing past a collision.
    fn probe_next(self) -> Self {
        Self::nonzero(self.0.wrapping_add(1) & LOCAL_ID_MASK)
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdentityMapper
// ---------------------------------------------------------------------------

/// Two-way `LocalId <-> BackendId` table.
///
/// `backend -> local` is memoized on first observation and never recomputed,
/// so repeated resyncs cannot fragment identity. The table is collision-checked:
/// a derived id already bound to another backend id is probed upward until a
/// free slot is found. Ids held by surviving local-only groups are reserved
/// and skipped the same way.
#[derive(Clone, Debug, Default)]
pub struct IdentityMapper {
    by_backend: HashMap<BackendId, LocalId>,
    by_local: HashMap<LocalId, BackendId>,
    reserved: HashSet<LocalId>,
}

impl IdentityMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (and register) the local id for a persisted backend id.
    ///
    /// `native` is a numeric id carried by the payload; it is preferred over the
    /// hash when its slot is free.
    pub fn resolve(&mut self, backend_id: &BackendId, native: Option<u64>) -> LocalId {
        if let Some(existing) = self.by_backend.get(backend_id) {
            return *existing;
        }

        let mut candidate = match native {
            Some(n) => LocalId::from_native(n),
            None => LocalId::from_backend(backend_id),
        };

        loop {
            match self.by_local.get(&candidate) {
                Some(owner) if owner == backend_id => break,
                Some(owner) => log::warn!(
                    "local id {} already bound to {}; probing for {}",
                    candidate,
                    owner,
                    backend_id
                ),
                None if self.reserved.contains(&candidate) => log::warn!(
                    "local id {} held by a local-only group; probing for {}",
                    candidate,
                    backend_id
                ),
                None => break,
            }
            candidate = candidate.probe_next();
        }

        self.by_backend.insert(backend_id.clone(), candidate);
        self.by_local.insert(candidate, backend_id.clone());
        candidate
    }

    /// Local id for a group that has no backend identifier. Not registered;
    /// call [`reserve`](Self::reserve) to keep it for as long as the group lives.
    pub fn local_only(&self, name: &str, timestamp_ms: i64) -> LocalId {
        let mut candidate = LocalId::from_content(name, timestamp_ms);
        while self.is_taken(candidate) {
            candidate = candidate.probe_next();
        }
        candidate
    }

    /// Hold a local-only id so no persisted group resolves onto it.
    pub fn reserve(&mut self, local_id: LocalId) {
        self.reserved.insert(local_id);
    }

    pub fn release(&mut self, local_id: LocalId) {
        self.reserved.remove(&local_id);
    }

    pub fn is_taken(&self, local_id: LocalId) -> bool {
        self.by_local.contains_key(&local_id) || self.reserved.contains(&local_id)
    }

    pub fn backend_for(&self, local_id: LocalId) -> Option<&BackendId> {
        self.by_local.get(&local_id)
    }

    pub fn local_for(&self, backend_id: &BackendId) -> Option<LocalId> {
        self.by_backend.get(backend_id).copied()
    }

    /// Number of registered persisted groups.
    pub fn len(&self) -> usize {
        self.by_backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_backend.is_empty()
    }

    /// Bind an explicit pair, used when a test or a migration needs to seed the table.
    pub(crate) fn bind(&mut self, local_id: LocalId, backend_id: BackendId) {
        self.by_backend.insert(backend_id.clone(), local_id);
        self.by_local.insert(local_id, backend_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
