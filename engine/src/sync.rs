//! Sync coordination between the local store and known peers.
//!
//! The coordinator owns the store, the peer directory, the session table and
//! the retry queue. Every local mutation goes through it so it can see the
//! age move and broadcast; every inbound snapshot goes through it so it can
//! decide whether to merge.
//!
//! # Merge rule
//!
//! Last-writer-wins at whole-store granularity: an inbound snapshot replaces
//! the local store iff its age is strictly greater than the local age.
//! Nothing is merged per key.

use crate::{
    codec::{Codec, Lz4Codec},
    error::Result,
    peers::{LocalIdentity, PeerDirectory},
    session::{PeerSession, RetryEntry, RetryPolicy, RetryQueue, SessionState},
    snapshot::SnapshotSummary,
    storage::Storage,
    store::{RecordStore, SetOutcome},
    transport::{Transport, TransportEvent},
    PeerId, Timestamp,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// What happened to an inbound snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InboundOutcome {
    /// The snapshot was newer and replaced the local store.
    Merged(SnapshotSummary),
    /// The snapshot was not newer (or malformed) and was discarded.
    Stale { local_age: Timestamp, remote_age: Timestamp },
}

/// Drives replication for one device.
#[derive(Debug)]
pub struct SyncCoordinator<S, P, T, C = Lz4Codec> {
    identity: LocalIdentity,
    store: RecordStore<S, C>,
    peers: PeerDirectory<P>,
    transport: T,
    sessions: BTreeMap<PeerId, PeerSession>,
    retries: RetryQueue,
    policy: RetryPolicy,
}

impl<S, P, T, C> SyncCoordinator<S, P, T, C>
where
    S: Storage,
    P: Storage,
    T: Transport,
    C: Codec,
{
    /// Create a coordinator with the default retry policy.
    pub fn new(
        identity: LocalIdentity,
        store: RecordStore<S, C>,
        peers: PeerDirectory<P>,
        transport: T,
    ) -> Self {
        Self {
            identity,
            store,
            peers,
            transport,
            sessions: BTreeMap::new(),
            retries: RetryQueue::new(),
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Read access to the store. Writes go through the coordinator.
    pub fn store(&self) -> &RecordStore<S, C> {
        &self.store
    }

    pub fn peers(&self) -> &PeerDirectory<P> {
        &self.peers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Pending reconnects.
    pub fn retries(&self) -> &RetryQueue {
        &self.retries
    }

    /// State of the session for a peer; `Idle` if none exists.
    pub fn session_state(&self, peer_id: &str) -> SessionState {
        self.sessions
            .get(peer_id)
            .map_or(SessionState::Idle, PeerSession::state)
    }

    /// All sessions with their state.
    pub fn sessions(&self) -> impl Iterator<Item = (&str, SessionState)> {
        self.sessions.iter().map(|(id, s)| (id.as_str(), s.state()))
    }

    // ------------------------------------------------------------------
    // Local mutations
    // ------------------------------------------------------------------

    /// Write a value and broadcast if the store changed.
    pub fn set<V>(&mut self, key: &str, value: &V, now: Timestamp) -> Result<SetOutcome>
    where
        V: Serialize + ?Sized,
    {
        let outcome = self.store.set(key, value, now)?;
        if outcome.changed() {
            self.on_local_change(now)?;
        }
        Ok(outcome)
    }

    /// Remove a value and broadcast.
    pub fn remove(&mut self, key: &str, now: Timestamp) -> Result<()> {
        self.store.remove(key, now)?;
        self.on_local_change(now)
    }

    /// Remove every value and broadcast if anything was removed.
    pub fn remove_all(&mut self, now: Timestamp) -> Result<usize> {
        let removed = self.store.remove_all(now)?;
        if removed > 0 {
            self.on_local_change(now)?;
        }
        Ok(removed)
    }

    /// The local age advanced: push the store to every known peer.
    pub fn on_local_change(&mut self, now: Timestamp) -> Result<()> {
        tracing::debug!(age = self.store.age(), "Local change; broadcasting");
        self.broadcast(false, now).map(|_| ())
    }

    /// Manually push the store to every known peer, optionally claiming a
    /// fresh age. Returns how many peers were sent to right away; the rest
    /// receive the snapshot when their connection opens.
    pub fn sync_all(&mut self, force: bool, now: Timestamp) -> Result<usize> {
        tracing::info!(force, peers = self.peers.len(), "Syncing with all peers");
        self.broadcast(force, now)
    }

    fn broadcast(&mut self, force: bool, now: Timestamp) -> Result<usize> {
        let targets: Vec<PeerId> = self
            .peers
            .list()
            .iter()
            .filter(|id| id.as_str() != self.identity.as_str())
            .cloned()
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let payload = self.store.export(force, now)?;
        let mut sent = 0;
        for peer_id in &targets {
            if self.sync_peer(peer_id, force, &payload, now) {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Send to an open peer, or dial and leave the send for `Open`.
    fn sync_peer(&mut self, peer_id: &str, force: bool, payload: &str, now: Timestamp) -> bool {
        let session = self
            .sessions
            .entry(peer_id.to_string())
            .or_insert_with(|| PeerSession::new(peer_id));

        if session.is_open() {
            return self.send(peer_id, payload.to_string(), now);
        }

        session.request_force(force);
        let was_failed = matches!(session.state(), SessionState::Failed { .. });
        if session.begin_connect() {
            if was_failed {
                self.retries.cancel(peer_id);
            }
            self.dial(peer_id, now);
        }
        false
    }

    fn dial(&mut self, peer_id: &str, now: Timestamp) {
        tracing::debug!(peer = %peer_id, state = %self.session_state(peer_id), "Dialing peer");
        if let Err(e) = self.transport.connect(peer_id) {
            tracing::warn!(peer = %peer_id, error = %e, "Failed to start connection");
            self.fail(peer_id, now);
        }
    }

    fn send(&mut self, peer_id: &str, payload: String, now: Timestamp) -> bool {
        match self.transport.send(peer_id, payload) {
            Ok(()) => {
                tracing::debug!(peer = %peer_id, "Snapshot sent");
                true
            }
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "Failed to send snapshot");
                self.fail(peer_id, now);
                false
            }
        }
    }

    /// Move a session to `Failed` and schedule the next reconnect, if any.
    fn fail(&mut self, peer_id: &str, now: Timestamp) {
        let Some(attempt) = self.sessions.get_mut(peer_id).and_then(PeerSession::on_error) else {
            return;
        };

        match self.policy.delay_after(attempt) {
            Some(delay) => {
                let fire_at = now.saturating_add(delay);
                tracing::info!(
                    peer = %peer_id,
                    attempt = attempt + 1,
                    delay_ms = delay,
                    "Scheduling reconnect"
                );
                self.retries.schedule(RetryEntry {
                    peer_id: peer_id.to_string(),
                    fire_at,
                    attempt: attempt + 1,
                });
            }
            None => {
                tracing::info!(
                    peer = %peer_id,
                    attempts = attempt,
                    "Giving up on peer until next sync"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Feed a transport event for a peer.
    ///
    /// Returns the merge outcome when the event carried a snapshot.
    pub fn on_transport_event(
        &mut self,
        peer_id: &str,
        event: TransportEvent,
        now: Timestamp,
    ) -> Result<Option<InboundOutcome>> {
        match event {
            TransportEvent::Open => {
                let Some(session) = self.sessions.get_mut(peer_id) else {
                    tracing::debug!(peer = %peer_id, "Open for unknown session; ignoring");
                    return Ok(None);
                };
                if !session.on_open() {
                    tracing::debug!(
                        peer = %peer_id,
                        state = %session.state(),
                        "Unexpected open; ignoring"
                    );
                    return Ok(None);
                }
                let force = session.take_force();
                tracing::info!(peer = %peer_id, "Connection open");
                let payload = self.store.export(force, now)?;
                self.send(peer_id, payload, now);
                Ok(None)
            }
            TransportEvent::Data(text) => self.on_inbound_message(peer_id, &text).map(Some),
            TransportEvent::Error(reason) => {
                tracing::warn!(peer = %peer_id, error = %reason, "Connection error");
                self.fail(peer_id, now);
                Ok(None)
            }
            TransportEvent::Close => {
                if let Some(session) = self.sessions.get_mut(peer_id) {
                    if session.on_close() {
                        tracing::info!(peer = %peer_id, "Connection closed");
                    }
                }
                Ok(None)
            }
        }
    }

    /// Handle a snapshot received from a peer.
    pub fn on_inbound_message(&mut self, peer_id: &str, text: &str) -> Result<InboundOutcome> {
        let snapshot = self.store.import(text);
        let local_age = self.store.age();

        if !self.store.clock().is_older_than(snapshot.age) {
            tracing::debug!(
                peer = %peer_id,
                local_age,
                remote_age = snapshot.age,
                "Ignoring snapshot that is not newer"
            );
            return Ok(InboundOutcome::Stale {
                local_age,
                remote_age: snapshot.age,
            });
        }

        self.store.apply(&snapshot)?;
        let summary = SnapshotSummary::from(&snapshot);
        tracing::info!(
            peer = %peer_id,
            local_age,
            remote_age = snapshot.age,
            keys = summary.key_count,
            "Merged newer snapshot"
        );
        Ok(InboundOutcome::Merged(summary))
    }

    /// Fire reconnects that are due. Returns how many dials were started.
    pub fn poll_retries(&mut self, now: Timestamp) -> usize {
        let mut dialed = 0;
        for entry in self.retries.due(now) {
            let started = self
                .sessions
                .get_mut(&entry.peer_id)
                .is_some_and(|s| s.begin_retry(entry.attempt));
            if started {
                tracing::info!(peer = %entry.peer_id, attempt = entry.attempt, "Reconnecting");
                self.dial(&entry.peer_id, now);
                dialed += 1;
            } else {
                tracing::debug!(
                    peer = %entry.peer_id,
                    attempt = entry.attempt,
                    "Dropping stale retry"
                );
            }
        }
        dialed
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    /// Remember a peer. Returns true if it was new.
    pub fn add_peer(&mut self, peer_id: &str) -> Result<bool> {
        self.peers.add(peer_id)
    }

    /// Forget a peer and drop its session. Returns true if it was known.
    pub fn remove_peer(&mut self, peer_id: &str) -> Result<bool> {
        let removed = self.peers.remove(peer_id)?;
        self.retries.cancel(peer_id);
        if self.sessions.remove(peer_id).is_some() {
            self.transport.disconnect(peer_id);
        }
        Ok(removed)
    }

    /// Dispose every session at once.
    pub fn shutdown(&mut self) {
        let peers: Vec<PeerId> = self.sessions.keys().cloned().collect();
        for peer_id in &peers {
            self.transport.disconnect(peer_id);
        }
        self.sessions.clear();
        self.retries.clear();
        tracing::info!(sessions = peers.len(), "Sync sessions disposed");
    }
}
