//! Inbound peer WebSocket endpoint.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::handlers::handle_peer_socket;
use crate::AppState;

/// Query parameters for `GET /ws`.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Identity of the dialing peer
    pub from: Option<String>,
}

/// Create WebSocket routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// GET /ws?from=<identity>
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let peer_id = query
        .from
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing ?from= peer identity".to_string()))?;
    if peer_id == state.identity {
        tracing::warn!("Refusing a socket dialed from this node");
        return Err(AppError::BadRequest("cannot connect to self".to_string()));
    }

    Ok(ws.on_upgrade(move |socket| {
        handle_peer_socket(socket, state.handle, state.connections, peer_id)
    }))
}
