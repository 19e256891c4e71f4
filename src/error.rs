use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::dao::room_store::RepositoryError;

/// Errors that can occur in service layer operations.
///
/// Every variant is recoverable and reported only to the caller that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The targeted room does not exist.
    #[error("room `{0}` not found")]
    RoomNotFound(String),
    /// The sender is not currently bound to a room member.
    #[error("you are not a member of any room")]
    UserNotFound,
    /// A vote was cast after the round was revealed.
    #[error("votes have already been revealed; reset the round to vote again")]
    RoundAlreadyRevealed,
    /// The sender lacks the privilege for the requested action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::RoomNotFound(room_id) => ServiceError::RoomNotFound(room_id),
            RepositoryError::UserNotFound(_) => ServiceError::UserNotFound,
            RepositoryError::RoundAlreadyRevealed => ServiceError::RoundAlreadyRevealed,
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller is not allowed to perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::RoomNotFound(_) | ServiceError::UserNotFound => {
                AppError::NotFound(message)
            }
            ServiceError::RoundAlreadyRevealed => AppError::Conflict(message),
            ServiceError::PermissionDenied(_) => AppError::Forbidden(message),
            ServiceError::InvalidInput(_) => AppError::BadRequest(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
