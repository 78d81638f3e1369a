use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Conflict {
        message: String,
        existing_id: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            existing_id: None,
        }
    }

    pub fn submission_conflict(message: impl Into<String>, existing_id: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            existing_id: Some(existing_id.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Error::Validation(message) => (StatusCode::BAD_REQUEST, json!({ "message": message })),
            Error::Conflict {
                message,
                existing_id,
            } => {
                let body = match existing_id {
                    Some(id) => json!({ "message": message, "existingId": id }),
                    None => json!({ "message": message }),
                };
                (StatusCode::CONFLICT, body)
            }
            Error::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "message": message })),
            Error::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "message": message }))
            }
            Error::Forbidden(message) => (StatusCode::FORBIDDEN, json!({ "message": message })),
            // Store/filesystem detail stays in the log; clients get a generic message.
            Error::Store(e) => {
                error!("store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Server error" }),
                )
            }
            Error::Io(e) => {
                error!("io error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Server error" }),
                )
            }
            Error::Internal(detail) => {
                error!("internal error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
