//! Peer directory endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::runtime::PeerListing;
use crate::transport::parse_peer_url;
use crate::websocket::ConnectionInfo;
use crate::AppState;

/// Body for adding or removing a peer.
#[derive(Debug, Deserialize)]
pub struct PeerRequest {
    /// Base WebSocket URL of the peer node
    pub peer: String,
}

/// Response for `GET /peers`.
#[derive(Debug, Serialize)]
pub struct PeersResponse {
    #[serde(flatten)]
    pub listing: PeerListing,
    /// Peers currently connected to us
    pub inbound: Vec<ConnectionInfo>,
}

/// Response for `POST /peers`.
#[derive(Debug, Serialize)]
pub struct AddPeerResponse {
    pub peer: String,
    pub added: bool,
}

/// Create peer routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/peers", get(list_peers).post(add_peer).delete(remove_peer))
}

/// GET /peers
async fn list_peers(State(state): State<AppState>) -> Result<Json<PeersResponse>> {
    let listing = state.handle.peers().await?;
    Ok(Json(PeersResponse {
        listing,
        inbound: state.connections.list(),
    }))
}

/// POST /peers - 201 if the peer is new, 200 if it was already known.
async fn add_peer(
    State(state): State<AppState>,
    Json(request): Json<PeerRequest>,
) -> Result<(StatusCode, Json<AddPeerResponse>)> {
    let peer = request.peer.trim().to_string();
    parse_peer_url(&peer)?;
    if state.config.is_self(&peer) {
        return Err(AppError::BadRequest(format!("{peer} is this node")));
    }

    let added = state.handle.add_peer(&peer).await?;
    let status = if added {
        tracing::info!(peer = %peer, "Peer added");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(AddPeerResponse { peer, added })))
}

/// DELETE /peers
async fn remove_peer(
    State(state): State<AppState>,
    Json(request): Json<PeerRequest>,
) -> Result<StatusCode> {
    let peer = request.peer.trim();
    if state.handle.remove_peer(peer).await? {
        tracing::info!(peer = %peer, "Peer removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("peer {peer:?}")))
    }
}
