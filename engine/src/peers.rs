//! Known peers and this device's identity.

use crate::{
    error::Result,
    storage::{Storage, IDENTITY_SLOT, PEERS_SLOT},
    Error, PeerId,
};
use std::collections::BTreeSet;

/// Prefix for generated device identities.
pub const IDENTITY_PREFIX: &str = "hearth-";

/// The persisted set of peers this device syncs with.
///
/// Entries are deduplicated and never expire on their own.
#[derive(Debug)]
pub struct PeerDirectory<S> {
    storage: S,
    peers: BTreeSet<PeerId>,
}

impl<S: Storage> PeerDirectory<S> {
    /// Load the directory from storage. A corrupt slot is logged and treated
    /// as empty.
    pub fn open(storage: S) -> Result<Self> {
        let peers = match storage.get_item(PEERS_SLOT)? {
            Some(raw) => serde_json::from_str::<Vec<PeerId>>(&raw)
                .map(|ids| ids.into_iter().collect())
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Known peers are corrupt; starting empty");
                    BTreeSet::new()
                }),
            None => BTreeSet::new(),
        };
        Ok(Self { storage, peers })
    }

    /// Remember a peer. Returns true if it was new.
    pub fn add(&mut self, peer_id: &str) -> Result<bool> {
        let peer_id = peer_id.trim();
        if peer_id.is_empty() {
            return Err(Error::InvalidPeerId(peer_id.to_string()));
        }
        if !self.peers.insert(peer_id.to_string()) {
            return Ok(false);
        }
        self.persist()?;
        tracing::info!(peer = %peer_id, "Peer added");
        Ok(true)
    }

    /// Forget a peer. Returns true if it was known.
    pub fn remove(&mut self, peer_id: &str) -> Result<bool> {
        if !self.peers.remove(peer_id) {
            return Ok(false);
        }
        self.persist()?;
        tracing::info!(peer = %peer_id, "Peer removed");
        Ok(true)
    }

    /// All known peers.
    pub fn list(&self) -> &BTreeSet<PeerId> {
        &self.peers
    }

    /// Check if a peer is known.
    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains(peer_id)
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// The underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn persist(&mut self) -> Result<()> {
        let raw = serde_json::to_string(&self.peers)?;
        self.storage.set_item(PEERS_SLOT, &raw)
    }
}

/// This device's stable peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalIdentity(PeerId);

impl LocalIdentity {
    /// Load the persisted identity, generating and persisting one on first use.
    pub fn load_or_create<S: Storage>(storage: &mut S) -> Result<Self> {
        if let Some(existing) = storage.get_item(IDENTITY_SLOT)? {
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(Self(existing.to_string()));
            }
        }

        let id = format!("{IDENTITY_PREFIX}{}", uuid::Uuid::new_v4());
        storage.set_item(IDENTITY_SLOT, &id)?;
        tracing::info!(identity = %id, "Generated local identity");
        Ok(Self(id))
    }

    /// Use a fixed identity.
    pub fn new(id: impl Into<PeerId>) -> Self {
        Self(id.into())
    }

    /// The identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
