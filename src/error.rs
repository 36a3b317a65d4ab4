//! The error taxonomy that crosses every component boundary in this crate.
//!
//! Modeled on `api_auth::error::AuthError` / `funding::error::TransferError`:
//! one `thiserror` enum carrying both a machine-readable code and a message,
//! with an `IntoResponse` impl so the gateway boundary can return it
//! directly from a handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error codes, per spec §7's taxonomy. Carried inside
/// `Rejection` (the payload written to the `reject:{user}:{sku}` cache
/// entry) as well as `ReservationError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Success,
    OutOfStock,
    UserAlreadyPurchased,
    UserHasActiveReservation,
    DuplicateRequest,
    InvalidRequest,
    ProductNotFound,
    ProcessingError,
    Timeout,
    CannotConfirm,
}

impl ErrorCode {
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::Success => StatusCode::OK,
            ErrorCode::OutOfStock
            | ErrorCode::UserAlreadyPurchased
            | ErrorCode::UserHasActiveReservation
            | ErrorCode::DuplicateRequest
            | ErrorCode::InvalidRequest
            | ErrorCode::CannotConfirm => StatusCode::BAD_REQUEST,
            ErrorCode::ProductNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ProcessingError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Errors a component can hand back to its caller. User-visible domain
/// failures and validation failures are `Rejection`-shaped (never touch the
/// database); `Database`/`Queue` are the transient-infrastructure channel
/// from spec §7 and are retried by the caller, not surfaced verbatim.
#[derive(Error, Debug)]
pub enum ReservationError {
    #[error("out of stock")]
    OutOfStock,

    #[error("user already purchased this sku")]
    UserAlreadyPurchased,

    #[error("user already holds an active reservation for this sku")]
    UserHasActiveReservation,

    #[error("duplicate request for idempotency key {0}")]
    DuplicateRequest(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("cannot confirm reservation: {0}")]
    CannotConfirm(String),

    #[error("poll timed out waiting for an outcome")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("log publish failed: {0}")]
    Queue(String),
}

impl ReservationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ReservationError::OutOfStock => ErrorCode::OutOfStock,
            ReservationError::UserAlreadyPurchased => ErrorCode::UserAlreadyPurchased,
            ReservationError::UserHasActiveReservation => ErrorCode::UserHasActiveReservation,
            ReservationError::DuplicateRequest(_) => ErrorCode::DuplicateRequest,
            ReservationError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ReservationError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            ReservationError::CannotConfirm(_) => ErrorCode::CannotConfirm,
            ReservationError::Timeout => ErrorCode::Timeout,
            ReservationError::Database(_) | ReservationError::Queue(_) => {
                ErrorCode::ProcessingError
            }
        }
    }

    /// Build the `Rejection` payload the Outcome Writer publishes to the
    /// response cache. Infrastructure failures are deliberately flattened to
    /// `PROCESSING_ERROR` here — callers never see a raw `sqlx::Error`.
    pub fn to_rejection(&self) -> crate::messages::Rejection {
        crate::messages::Rejection {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

impl IntoResponse for ReservationError {
    fn into_response(self) -> Response {
        let status = self.code().http_status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_errors_surface_as_processing_error() {
        let err = ReservationError::Queue("partition 3 full".into());
        assert_eq!(err.code(), ErrorCode::ProcessingError);
    }

    #[test]
    fn domain_errors_map_to_their_documented_code() {
        assert_eq!(ReservationError::OutOfStock.code(), ErrorCode::OutOfStock);
        assert_eq!(
            ReservationError::UserHasActiveReservation.code(),
            ErrorCode::UserHasActiveReservation
        );
    }
}
