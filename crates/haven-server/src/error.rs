use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use haven_store::StoreError;
use thiserror::Error;

use crate::projector::ItemError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("record not found".into()),
            StoreError::Conflict(msg) => ServerError::Conflict(msg),
            StoreError::ForeignField { .. }
            | StoreError::UnknownLabel(_)
            | StoreError::UnresolvedPerson { .. }
            | StoreError::UnknownLookupList(_)
            | StoreError::Domain(_) => ServerError::BadRequest(e.to_string()),
            other => ServerError::Store(other),
        }
    }
}

impl From<ItemError> for ServerError {
    fn from(e: ItemError) -> Self {
        match e {
            ItemError::Store(inner) => inner.into(),
            other => ServerError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ServerError::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
