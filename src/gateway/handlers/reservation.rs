//! Reservation handlers: place a hold, cancel a hold.
//!
//! Same `push().is_err()` -> 503 shape the teacher's `create_order` uses,
//! except the submit/enqueue step is wrapped inside `Submitter`, which also
//! does the pre-validation reads spec §4.1 calls for before anything touches
//! the log.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::core_types::{CorrelationId, ReservationId};
use crate::error::ReservationError;
use crate::messages::ReservationMessage;

use super::super::state::AppState;
use super::super::types::{outcome_into_result, CancelResponse, CreateReservationRequest, ReservationResponse};

/// `POST /reservations`
pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Json<ReservationResponse>, ReservationError> {
    tracing::info!(user_id = %req.user_id, sku_id = %req.sku_id, "reservation request received");
    let outcome = state
        .submitter
        .submit_and_wait(&req.user_id, &req.sku_id, req.quantity)
        .await?;
    outcome_into_result(outcome).map(Json)
}

/// `DELETE /reservations/{id}`
///
/// Fire-and-poll like checkout: route a `Cancel` message through the sku's
/// partition (so it serializes against a racing CONFIRM/EXPIRE) then wait for
/// the row to leave RESERVED.
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Json<CancelResponse>, ReservationError> {
    let reservation = state
        .repository
        .get_reservation(reservation_id)
        .await?
        .ok_or_else(|| ReservationError::CannotConfirm(format!("{reservation_id} not found")))?;

    let message = ReservationMessage::Cancel {
        reservation_id,
        sku_id: reservation.sku_id.clone(),
        correlation_id: CorrelationId::new_v4(),
    };
    state
        .log
        .publish(message)
        .map_err(|_| ReservationError::Queue(format!("partition for sku {} is full", reservation.sku_id)))?;

    super::order::wait_for_terminal_status(&state, reservation_id, crate::models::ReservationStatus::Cancelled)
        .await?;

    Ok(Json(CancelResponse {
        reservation_id,
        status: "CANCELLED",
    }))
}
