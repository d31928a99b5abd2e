//! Manual sync endpoint.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::AppState;

/// Request body for `POST /sync`.
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Stamp the outgoing snapshot with the current time so it wins
    #[serde(default)]
    pub force: bool,
}

/// Response for `POST /sync`.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub force: bool,
    /// Peers sent to right away; the rest get the snapshot once connected
    pub sent: usize,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", post(sync_handler))
}

/// POST /sync - Push the store to every known peer.
async fn sync_handler(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    let sent = state.handle.sync(request.force).await?;
    Ok(Json(SyncResponse {
        force: request.force,
        sent,
    }))
}
