use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    credentials::CredentialError,
    dao::storage::StorageError,
    dto::ws::InvalidMessage,
    state::{queue::QueueError, room::RoomError},
};

/// Errors that can occur in service layer operations.
///
/// Each variant maps to a stable [`ServiceError::kind`] that clients branch on.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or oversized input.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Missing, expired or mismatched session token.
    #[error("unauthorized: {0}")]
    Auth(String),
    /// Wrong or missing room passcode.
    #[error("incorrect passcode")]
    Passcode,
    /// Authenticated but not allowed to perform the action.
    #[error("forbidden: {0}")]
    Permission(String),
    /// Name already connected without a superseding credential, or key taken.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Unexpected failure (actor gone, blocking task panicked, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable identifier of the error family.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Auth(_) => "auth",
            ServiceError::Passcode => "passcode",
            ServiceError::Permission(_) => "permission",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidMessage> for ServiceError {
    fn from(err: InvalidMessage) -> Self {
        ServiceError::Validation(err.message)
    }
}

impl From<RoomError> for ServiceError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::UnknownParticipant(_) => ServiceError::NotFound(err.to_string()),
            RoomError::Spectator(_) => ServiceError::Permission(err.to_string()),
            RoomError::InvalidVote(_)
            | RoomError::InvalidStructuredVote(_)
            | RoomError::InvalidData(_) => ServiceError::Validation(err.to_string()),
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            QueueError::DuplicateTicketId(_) => ServiceError::Conflict(err.to_string()),
            QueueError::NotPending(_) | QueueError::AtBoundary(_) | QueueError::Exhausted(_) => {
                ServiceError::Validation(err.to_string())
            }
        }
    }
}

impl From<CredentialError> for ServiceError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidPasscodeLength | CredentialError::InvalidIterations => {
                ServiceError::Validation(err.to_string())
            }
            CredentialError::InvalidSignature(_) | CredentialError::Payload => {
                ServiceError::Auth(err.to_string())
            }
            CredentialError::Random => ServiceError::Internal(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Wrong room passcode.
    #[error("incorrect passcode")]
    Passcode,
    /// Authenticated but not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "validation",
            AppError::Unauthorized(_) => "auth",
            AppError::Passcode => "passcode",
            AppError::Forbidden(_) => "permission",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::ServiceUnavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => AppError::BadRequest(message),
            ServiceError::Auth(message) => AppError::Unauthorized(message),
            ServiceError::Passcode => AppError::Passcode,
            ServiceError::Permission(message) => AppError::Forbidden(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Passcode | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
