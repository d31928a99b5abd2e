//! Handler for sockets opened by peers.
//!
//! Every text frame is one snapshot. Frames are handed to the event loop in
//! arrival order; the merge decision happens there.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::runtime::NodeHandle;
use crate::websocket::ConnectionManager;

/// Handle an established inbound WebSocket connection.
///
/// This function:
/// 1. Registers the connection with the manager
/// 2. Spawns a task to forward control frames
/// 3. Passes incoming snapshots to the event loop
/// 4. Cleans up on disconnect
pub async fn handle_peer_socket(
    socket: WebSocket,
    handle: NodeHandle,
    conn_manager: Arc<ConnectionManager>,
    peer_id: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = conn_manager.register(peer_id.clone(), tx);

    tracing::info!(
        conn_id = %conn_id,
        peer = %peer_id,
        "Peer connected"
    );

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if let Err(e) = ws_sender.send(frame).await {
                tracing::warn!("Failed to write WebSocket frame: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                tracing::debug!(
                    conn_id = %conn_id,
                    bytes = text.as_str().len(),
                    "Snapshot received"
                );
                if handle.inbound(&peer_id, text.as_str().to_owned()).is_err() {
                    tracing::warn!(conn_id = %conn_id, "Sync loop stopped; dropping connection");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        peer = %peer_id,
        active_connections = conn_manager.connection_count(),
        "Peer disconnected"
    );
}
