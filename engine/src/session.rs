//! Per-peer connection sessions and the retry queue.
//!
//! ```text
//!   Idle/Closed ──connect──► Connecting{n} ──open──► Open{n} ──close──► Closed
//!                                 │                    │
//!                               error                error
//!                                 ▼                    ▼
//!                            Failed{n} ◄───────────────┘
//!                                 │
//!                  n < max: retry at now + base × (n+1) as Connecting{n+1}
//!                  n = max: stay Failed until the next external sync
//! ```

use crate::{PeerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting { attempt: u32 },
    Open { attempt: u32 },
    Closed,
    Failed { attempt: u32 },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            SessionState::Open { .. } => write!(f, "open"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed { attempt } => write!(f, "failed (attempt {attempt})"),
        }
    }
}

/// Bounded linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Reconnects allowed after the first dial
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `base_delay_ms × (n+1)`
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after a failure at `attempt`, or `None` to give up.
    pub fn delay_after(&self, attempt: u32) -> Option<u64> {
        (attempt < self.max_attempts)
            .then(|| self.base_delay_ms.saturating_mul(u64::from(attempt) + 1))
    }
}

/// The lifecycle of the connection to one peer.
#[derive(Debug, Clone)]
pub struct PeerSession {
    peer_id: PeerId,
    state: SessionState,
    /// Whether the sync waiting on this connection asked for a fresh age
    force: bool,
}

impl PeerSession {
    /// A session that has not dialed yet.
    pub fn new(peer_id: impl Into<PeerId>) -> Self {
        Self {
            peer_id: peer_id.into(),
            state: SessionState::Idle,
            force: false,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open { .. })
    }

    /// Start a fresh dial. Returns false if one is already in flight or open.
    ///
    /// From `Failed` this is the external re-trigger: the attempt count
    /// starts over.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            SessionState::Connecting { .. } | SessionState::Open { .. } => false,
            SessionState::Idle | SessionState::Closed | SessionState::Failed { .. } => {
                self.state = SessionState::Connecting { attempt: 0 };
                true
            }
        }
    }

    /// Start a scheduled reconnect. Returns false if the session moved on
    /// since the retry was scheduled.
    pub fn begin_retry(&mut self, attempt: u32) -> bool {
        match self.state {
            SessionState::Failed { attempt: failed } if failed + 1 == attempt => {
                self.state = SessionState::Connecting { attempt };
                true
            }
            _ => false,
        }
    }

    /// The transport reported the connection open.
    pub fn on_open(&mut self) -> bool {
        match self.state {
            SessionState::Connecting { attempt } => {
                self.state = SessionState::Open { attempt };
                true
            }
            _ => false,
        }
    }

    /// The transport reported an error. Returns the attempt that failed.
    pub fn on_error(&mut self) -> Option<u32> {
        match self.state {
            SessionState::Connecting { attempt } | SessionState::Open { attempt } => {
                self.state = SessionState::Failed { attempt };
                Some(attempt)
            }
            _ => None,
        }
    }

    /// The transport reported the connection closed.
    pub fn on_close(&mut self) -> bool {
        match self.state {
            SessionState::Connecting { .. } | SessionState::Open { .. } => {
                self.state = SessionState::Closed;
                true
            }
            _ => false,
        }
    }

    /// Remember that the pending sync wants a fresh age.
    pub fn request_force(&mut self, force: bool) {
        self.force |= force;
    }

    /// Consume the pending force flag.
    pub fn take_force(&mut self) -> bool {
        std::mem::take(&mut self.force)
    }
}

/// A scheduled reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub peer_id: PeerId,
    pub fire_at: Timestamp,
    pub attempt: u32,
}

/// Reconnects waiting for their time, polled by the host's event loop.
#[derive(Debug, Clone, Default)]
pub struct RetryQueue {
    /// Kept sorted by `fire_at`
    entries: Vec<RetryEntry>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn schedule(&mut self, entry: RetryEntry) {
        let pos = self
            .entries
            .partition_point(|e| e.fire_at <= entry.fire_at);
        self.entries.insert(pos, entry);
    }

    /// Remove and return every entry due at `now`, earliest first.
    pub fn due(&mut self, now: Timestamp) -> Vec<RetryEntry> {
        let split = self.entries.partition_point(|e| e.fire_at <= now);
        self.entries.drain(..split).collect()
    }

    /// Drop all entries for a peer.
    pub fn cancel(&mut self, peer_id: &str) {
        self.entries.retain(|e| e.peer_id != peer_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// When the next entry fires.
    pub fn next_fire_at(&self) -> Option<Timestamp> {
        self.entries.first().map(|e| e.fire_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetryEntry> {
        self.entries.iter()
    }
}
