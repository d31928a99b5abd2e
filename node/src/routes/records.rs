//! Record endpoints: the application's `get`/`set`/`remove`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use hearth_engine::SetOutcome;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::runtime::StoreStatus;
use crate::AppState;

/// Response for a write.
#[derive(Debug, Serialize)]
pub struct SetResponse {
    pub outcome: SetOutcome,
}

/// Response for clearing the store.
#[derive(Debug, Serialize)]
pub struct RemoveAllResponse {
    pub removed: usize,
}

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_records).delete(remove_all))
        .route(
            "/records/{key}",
            get(get_record).put(set_record).delete(remove_record),
        )
}

/// GET /records - Keys and age of the local store.
async fn list_records(State(state): State<AppState>) -> Result<Json<StoreStatus>> {
    Ok(Json(state.handle.status().await?))
}

/// GET /records/{key}
async fn get_record(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    state
        .handle
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("record {key:?}")))
}

/// PUT /records/{key} - Body is the JSON value to store. A null body is
/// accepted and ignored.
async fn set_record(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<SetResponse>> {
    let outcome = state.handle.set(&key, value).await?;
    Ok(Json(SetResponse { outcome }))
}

/// DELETE /records/{key}
async fn remove_record(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    if state.handle.remove(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("record {key:?}")))
    }
}

/// DELETE /records - Remove every record.
async fn remove_all(State(state): State<AppState>) -> Result<Json<RemoveAllResponse>> {
    let removed = state.handle.remove_all().await?;
    Ok(Json(RemoveAllResponse { removed }))
}
