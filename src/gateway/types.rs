//! HTTP request/response DTOs for the reservation gateway.

use serde::{Deserialize, Serialize};

use crate::core_types::{Money, OrderId, ReservationId, SkuId};
use crate::messages::Outcome;

/// `POST /reservations` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReservationRequest {
    pub user_id: String,
    pub sku_id: SkuId,
    pub quantity: i32,
}

/// `POST /reservations` response, once the batch consumer has produced an
/// outcome (or the poll budget ran out).
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub reservation_id: ReservationId,
    pub status: &'static str,
}

/// Translate the Poller's result into the handler's `Result`. A rejection's
/// `ErrorCode` is mapped back to the matching `ReservationError` variant so
/// the existing `IntoResponse` impl produces the right status/body.
pub fn outcome_into_result(
    outcome: Outcome,
) -> Result<ReservationResponse, crate::error::ReservationError> {
    use crate::error::{ErrorCode, ReservationError};

    match outcome {
        Outcome::Success { reservation_id } => Ok(ReservationResponse {
            reservation_id,
            status: "RESERVED",
        }),
        Outcome::Rejected(rejection) => Err(match rejection.code {
            ErrorCode::OutOfStock => ReservationError::OutOfStock,
            ErrorCode::UserAlreadyPurchased => ReservationError::UserAlreadyPurchased,
            ErrorCode::UserHasActiveReservation => ReservationError::UserHasActiveReservation,
            ErrorCode::DuplicateRequest => ReservationError::DuplicateRequest(rejection.message),
            ErrorCode::InvalidRequest => ReservationError::InvalidRequest(rejection.message),
            ErrorCode::ProductNotFound => ReservationError::ProductNotFound(rejection.message),
            ErrorCode::CannotConfirm => ReservationError::CannotConfirm(rejection.message),
            ErrorCode::Timeout => ReservationError::Timeout,
            ErrorCode::Success | ErrorCode::ProcessingError => {
                ReservationError::Queue(rejection.message)
            }
        }),
        Outcome::Timeout => Err(crate::error::ReservationError::Timeout),
    }
}

/// `POST /orders/checkout` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub reservation_id: ReservationId,
    pub payment_transaction_id: String,
    #[serde(default)]
    pub shipping_address: Option<String>,
}

/// `POST /orders/checkout` response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub reservation_id: ReservationId,
    pub total_price: Money,
    pub status: &'static str,
}

/// `DELETE /reservations/{id}` response.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub reservation_id: ReservationId,
    pub status: &'static str,
}

/// `GET /products/{sku_id}/availability` response.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub sku_id: SkuId,
    pub available: i64,
}
