//! The event loop that owns the sync coordinator.
//!
//! Every store mutation, session change and retry goes through one task
//! reading one channel, so the coordinator never needs a lock. HTTP handlers
//! talk to it through a cloneable [`NodeHandle`]; the WebSocket transport and
//! the inbound socket handler push [`NodeEvent`]s into the same channel.

use std::time::Duration;

use hearth_engine::{
    error::Result as EngineResult, Lz4Codec, PeerId, RecordStore, SessionState, SetOutcome,
    SyncCoordinator, Timestamp, TransportEvent,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::error::{AppError, Result};
use crate::storage::FileStorage;
use crate::transport::WsTransport;

/// The coordinator as wired in the node.
pub type NodeCoordinator = SyncCoordinator<FileStorage, FileStorage, WsTransport, Lz4Codec>;

type Reply<T> = oneshot::Sender<T>;

/// Everything the event loop reacts to.
pub enum NodeEvent {
    Get {
        key: String,
        reply: Reply<Option<Value>>,
    },
    Set {
        key: String,
        value: Value,
        reply: Reply<EngineResult<SetOutcome>>,
    },
    Remove {
        key: String,
        reply: Reply<EngineResult<bool>>,
    },
    RemoveAll {
        reply: Reply<EngineResult<usize>>,
    },
    Status {
        reply: Reply<StoreStatus>,
    },
    Sync {
        force: bool,
        reply: Reply<EngineResult<usize>>,
    },
    ListPeers {
        reply: Reply<PeerListing>,
    },
    AddPeer {
        peer: PeerId,
        reply: Reply<EngineResult<bool>>,
    },
    RemovePeer {
        peer: PeerId,
        reply: Reply<EngineResult<bool>>,
    },
    /// Something happened on an outbound link.
    Transport {
        peer: PeerId,
        link: u64,
        event: TransportEvent,
    },
    /// A snapshot arrived on an inbound socket.
    Inbound { peer: PeerId, text: String },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Keys and age of the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub identity: String,
    pub keys: Vec<String>,
    pub age: Timestamp,
}

/// A known peer and its session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub id: PeerId,
    #[serde(flatten)]
    pub state: SessionState,
}

/// Known peers plus pending reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerListing {
    pub identity: String,
    pub peers: Vec<PeerStatus>,
    pub pending_retries: usize,
}

/// Wall-clock milliseconds.
pub fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Create the event channel.
pub fn channel() -> (NodeHandle, mpsc::UnboundedReceiver<NodeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NodeHandle { tx }, rx)
}

/// Cloneable access to the event loop.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeHandle {
    /// Sender for transport and inbound events.
    pub fn events(&self) -> mpsc::UnboundedSender<NodeEvent> {
        self.tx.clone()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> NodeEvent) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| AppError::Unavailable)?;
        rx.await.map_err(|_| AppError::Unavailable)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.request(|reply| NodeEvent::Get { key, reply }).await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<SetOutcome> {
        let key = key.to_string();
        Ok(self
            .request(|reply| NodeEvent::Set { key, value, reply })
            .await??)
    }

    /// Returns false if the key was not in the store.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        Ok(self.request(|reply| NodeEvent::Remove { key, reply }).await??)
    }

    pub async fn remove_all(&self) -> Result<usize> {
        Ok(self.request(|reply| NodeEvent::RemoveAll { reply }).await??)
    }

    pub async fn status(&self) -> Result<StoreStatus> {
        self.request(|reply| NodeEvent::Status { reply }).await
    }

    pub async fn sync(&self, force: bool) -> Result<usize> {
        Ok(self.request(|reply| NodeEvent::Sync { force, reply }).await??)
    }

    pub async fn peers(&self) -> Result<PeerListing> {
        self.request(|reply| NodeEvent::ListPeers { reply }).await
    }

    pub async fn add_peer(&self, peer: &str) -> Result<bool> {
        let peer = peer.to_string();
        Ok(self.request(|reply| NodeEvent::AddPeer { peer, reply }).await??)
    }

    pub async fn remove_peer(&self, peer: &str) -> Result<bool> {
        let peer = peer.to_string();
        Ok(self
            .request(|reply| NodeEvent::RemovePeer { peer, reply })
            .await??)
    }

    /// Hand a snapshot from an inbound socket to the loop.
    pub fn inbound(&self, peer: &str, text: String) -> Result<()> {
        self.tx
            .send(NodeEvent::Inbound {
                peer: peer.to_string(),
                text,
            })
            .map_err(|_| AppError::Unavailable)
    }

    /// Dispose every session and stop the loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| NodeEvent::Shutdown { reply }).await
    }
}

/// The loop itself.
pub struct Runtime {
    coordinator: NodeCoordinator,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    tick: Duration,
}

impl Runtime {
    pub fn new(
        coordinator: NodeCoordinator,
        events: mpsc::UnboundedReceiver<NodeEvent>,
        tick: Duration,
    ) -> Self {
        Self {
            coordinator,
            events,
            tick,
        }
    }

    /// Run until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            identity = %self.coordinator.identity(),
            peers = self.coordinator.peers().len(),
            age = self.coordinator.store().age(),
            "Sync loop started"
        );
        if let Err(e) = self.coordinator.sync_all(false, now_millis()) {
            tracing::warn!(error = %e, "Initial sync failed");
        }

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(NodeEvent::Shutdown { reply }) => {
                        self.coordinator.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(event) => self.handle(event),
                    None => {
                        self.coordinator.shutdown();
                        break;
                    }
                },
                _ = tick.tick() => {
                    let dialed = self.coordinator.poll_retries(now_millis());
                    if dialed > 0 {
                        tracing::debug!(dialed, "Retry queue fired");
                    }
                }
            }
        }

        tracing::info!("Sync loop stopped");
    }

    fn handle(&mut self, event: NodeEvent) {
        let now = now_millis();
        let sync = &mut self.coordinator;

        // A dropped reply means the requester went away; nothing to do
        match event {
            NodeEvent::Get { key, reply } => {
                let _ = reply.send(sync.store().get(&key));
            }
            NodeEvent::Set { key, value, reply } => {
                let _ = reply.send(sync.set(&key, &value, now));
            }
            NodeEvent::Remove { key, reply } => {
                let result = if sync.store().contains(&key) {
                    sync.remove(&key, now).map(|()| true)
                } else {
                    Ok(false)
                };
                let _ = reply.send(result);
            }
            NodeEvent::RemoveAll { reply } => {
                let _ = reply.send(sync.remove_all(now));
            }
            NodeEvent::Status { reply } => {
                let _ = reply.send(status(sync.store(), sync.identity().as_str()));
            }
            NodeEvent::Sync { force, reply } => {
                let _ = reply.send(sync.sync_all(force, now));
            }
            NodeEvent::ListPeers { reply } => {
                let _ = reply.send(PeerListing {
                    identity: sync.identity().to_string(),
                    peers: sync
                        .peers()
                        .list()
                        .iter()
                        .map(|id| PeerStatus {
                            id: id.clone(),
                            state: sync.session_state(id),
                        })
                        .collect(),
                    pending_retries: sync.retries().len(),
                });
            }
            NodeEvent::AddPeer { peer, reply } => {
                let _ = reply.send(sync.add_peer(&peer));
            }
            NodeEvent::RemovePeer { peer, reply } => {
                let _ = reply.send(sync.remove_peer(&peer));
            }
            NodeEvent::Transport { peer, link, event } => {
                if !sync.transport().is_current(&peer, link) {
                    tracing::debug!(peer = %peer, link, "Event from a dropped link; ignoring");
                    return;
                }
                if matches!(event, TransportEvent::Error(_) | TransportEvent::Close) {
                    sync.transport_mut().release(&peer, link);
                }
                if let Err(e) = sync.on_transport_event(&peer, event, now) {
                    tracing::error!(peer = %peer, error = %e, "Failed to handle transport event");
                }
            }
            NodeEvent::Inbound { peer, text } => {
                if let Err(e) = sync.on_inbound_message(&peer, &text) {
                    tracing::error!(peer = %peer, error = %e, "Failed to apply inbound snapshot");
                }
            }
            NodeEvent::Shutdown { reply } => {
                sync.shutdown();
                let _ = reply.send(());
            }
        }
    }
}

fn status(store: &RecordStore<FileStorage, Lz4Codec>, identity: &str) -> StoreStatus {
    StoreStatus {
        identity: identity.to_string(),
        keys: store.keys().to_vec(),
        age: store.age(),
    }
}
