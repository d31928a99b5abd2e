//! Unified error handling for the node.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::transport::PeerUrlError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] hearth_engine::Error),

    #[error("Invalid peer: {0}")]
    PeerUrl(#[from] PeerUrlError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sync loop is not running")]
    Unavailable,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use hearth_engine::Error;

        let (status, error_message, details) = match &self {
            AppError::Engine(Error::Storage(msg)) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Engine(Error::Transport(msg)) => {
                tracing::warn!("Transport error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Transport error".to_string(), Some(msg.clone()))
            }
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::PeerUrl(e) => (StatusCode::BAD_REQUEST, e.to_string(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Unavailable => {
                tracing::error!("Request arrived after the sync loop stopped");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string(), None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (
                AppError::Engine(hearth_engine::Error::Storage("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Engine(hearth_engine::Error::InvalidPeerId(" ".into())),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (AppError::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
