//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::Result;
use crate::AppState;

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub identity: String,
    pub age: u64,
    pub inbound_connections: usize,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler. Fails with 503 once the sync loop is gone.
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let status = state.handle.status().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        identity: status.identity,
        age: status.age,
        inbound_connections: state.connections.connection_count(),
    }))
}

/// Root handler.
async fn root() -> &'static str {
    "Hearth Node"
}
