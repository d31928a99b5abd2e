//! # Hearth Engine
//!
//! A peer-replicated key/value store for local-first applications.
//!
//! Every device keeps a full copy of the application state in a compressed
//! on-device store. Devices push whole-store snapshots to each other over
//! direct peer connections, and the newer store wins.
//!
//! ## Design Principles
//!
//! - **No IO**: storage, transport and time are supplied by the host
//! - **Deterministic**: every operation takes `now` explicitly
//! - **Single writer**: the [`SyncCoordinator`] owns the store and serializes
//!   all mutations
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A record is a key and a compressed JSON blob. The [`KeyIndex`] says which
//! records exist; a key outside the index does not exist.
//!
//! ### Age
//!
//! One [`StoreClock`] timestamp covers the whole store. Every local mutation
//! advances it; it is the only thing compared during a merge.
//!
//! ### Snapshots
//!
//! A [`Snapshot`] is every key, its blob as stored, and the age. It travels
//! as compressed JSON, one snapshot per message.
//!
//! ### Sessions
//!
//! Each peer has a [`PeerSession`] state machine with bounded linear backoff.
//! Reconnects sit in an explicit [`RetryQueue`] that the host polls.
//!
//! ## Quick Start
//!
//! ```rust
//! use hearth_engine::{
//!     LocalIdentity, Lz4Codec, MemoryStorage, MemoryTransport, PeerDirectory,
//!     RecordStore, SyncCoordinator, TransportEvent,
//! };
//! use serde_json::json;
//!
//! // 1. Open the store and peer directory
//! let store = RecordStore::open(MemoryStorage::new(), Lz4Codec).unwrap();
//! let mut peers = PeerDirectory::open(MemoryStorage::new()).unwrap();
//! peers.add("ws://192.168.1.20:7878").unwrap();
//!
//! // 2. Build the coordinator
//! let mut sync = SyncCoordinator::new(
//!     LocalIdentity::new("hearth-laptop"),
//!     store,
//!     peers,
//!     MemoryTransport::new(),
//! );
//!
//! // 3. Write through the coordinator; known peers are dialed
//! sync.set("tasks", &json!([{"title": "Plan week"}]), 1706745600000).unwrap();
//!
//! // 4. When the transport reports the connection open, the snapshot is sent
//! sync.on_transport_event("ws://192.168.1.20:7878", TransportEvent::Open, 1706745600100)
//!     .unwrap();
//! assert_eq!(sync.transport().sent.len(), 1);
//! ```

pub mod clock;
pub mod codec;
pub mod error;
pub mod peers;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transport;

// Re-export main types at crate root
pub use clock::StoreClock;
pub use codec::{Blob, Codec, Lz4Codec};
pub use error::Error;
pub use peers::{LocalIdentity, PeerDirectory};
pub use session::{PeerSession, RetryEntry, RetryPolicy, RetryQueue, SessionState};
pub use snapshot::{Snapshot, SnapshotSummary, MAX_AGE};
pub use storage::{MemoryStorage, Storage};
pub use store::{KeyIndex, RecordStore, SetOutcome};
pub use sync::{InboundOutcome, SyncCoordinator};
pub use transport::{MemoryTransport, Transport, TransportEvent};

/// Type aliases for clarity
pub type Key = String;
pub type PeerId = String;
pub type Timestamp = u64;
