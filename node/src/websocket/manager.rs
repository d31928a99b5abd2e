//! Inbound WebSocket connection manager.
//!
//! Tracks peers that dialed this node so they can be listed and closed on
//! shutdown. Snapshots received on these sockets go straight to the event
//! loop; nothing is ever pushed back over them except control frames.

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

/// Sender for frames written to an inbound socket.
pub type FrameSender = mpsc::UnboundedSender<Message>;

/// A single inbound connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Identity the remote peer announced with `?from=`
    pub peer_id: String,
    pub connected_at: DateTime<Utc>,
    /// Channel to write frames to this connection
    pub sender: FrameSender,
}

/// What `GET /peers` shows about an inbound connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub peer_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Manages active inbound connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<String, Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection. Returns the connection ID.
    pub fn register(&self, peer_id: String, sender: FrameSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        let connection = Connection {
            id: conn_id.clone(),
            peer_id,
            connected_at: Utc::now(),
            sender,
        };
        self.connections.insert(conn_id.clone(), connection);

        conn_id
    }

    /// Unregister a connection.
    pub fn unregister(&self, conn_id: &str) -> Option<Connection> {
        self.connections.remove(conn_id).map(|(_, conn)| conn)
    }

    /// Ask every inbound socket to close. Returns how many were asked.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.connections.iter() {
            if entry.value().sender.send(Message::Close(None)).is_ok() {
                closed += 1;
            }
        }
        tracing::debug!(closed, "Closing inbound connections");
        closed
    }

    /// Snapshot of the connections, oldest first.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .iter()
            .map(|entry| {
                let conn = entry.value();
                ConnectionInfo {
                    id: conn.id.clone(),
                    peer_id: conn.peer_id.clone(),
                    connected_at: conn.connected_at,
                }
            })
            .collect();
        infos.sort_by_key(|c| c.connected_at);
        infos
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.register("hearth-laptop".to_string(), tx);
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.list()[0].peer_id, "hearth-laptop");

        let conn = manager.unregister(&conn_id).unwrap();
        assert_eq!(conn.id, conn_id);
        assert_eq!(manager.connection_count(), 0);
        assert!(manager.unregister(&conn_id).is_none());
    }

    #[test]
    fn test_close_all() {
        let manager = ConnectionManager::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        manager.register("a".to_string(), tx1);
        manager.register("b".to_string(), tx2);
        drop(rx2);

        // The dropped receiver no longer counts
        assert_eq!(manager.close_all(), 1);
        assert!(matches!(rx1.try_recv(), Ok(Message::Close(None))));
    }
}
