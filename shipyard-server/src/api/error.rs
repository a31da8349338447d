//! API Error Handling
//!
//! Every failure is answered with a `{"message": ...}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use shipyard_core::dto::Message;

use crate::state::StateError;

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest,
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found"),
            ApiError::BadRequest => (StatusCode::BAD_REQUEST, "bad request"),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };

        (status, Json(Message::new(message))).into_response()
    }
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NoVersion(_) | StateError::NoLogFile(_) => ApiError::NotFound,
            StateError::Io(e) => {
                tracing::warn!("Cannot read captured output: {}", e);
                ApiError::NotFound
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
