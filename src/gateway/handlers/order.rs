//! Checkout handler: confirms a reservation into an order.
//!
//! Confirm is routed through the sku's partition rather than applied
//! directly, the same way `Cancel` is — a payment confirmation racing the
//! Expiry Sweeper's `Expire` for the same reservation must resolve through
//! the single writer, not two independent transactions.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;

use crate::cache::ConfirmedOrder;
use crate::core_types::CorrelationId;
use crate::error::ReservationError;
use crate::messages::ReservationMessage;
use crate::models::ReservationStatus;

use super::super::state::AppState;
use super::super::types::{CheckoutRequest, CheckoutResponse};

const CHECKOUT_POLL_ATTEMPTS: u32 = 100;
const CHECKOUT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// `POST /orders/checkout`
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ReservationError> {
    let reservation = state
        .repository
        .get_reservation(req.reservation_id)
        .await?
        .ok_or_else(|| {
            ReservationError::CannotConfirm(format!("{} not found", req.reservation_id))
        })?;

    // A reservation that's already CONFIRMED is a legitimate repeat call
    // (the caller's first response was lost, or it's retrying), not an
    // error - `Repository::confirm_reservation` treats it as a no-op, so
    // the only thing left to reject here is a hold that's neither still
    // live nor already confirmed (cancelled, expired, or unknown).
    if reservation.status != ReservationStatus::Confirmed
        && !reservation.is_live(chrono::Utc::now())
    {
        return Err(ReservationError::CannotConfirm(format!(
            "{} is not an active hold",
            req.reservation_id
        )));
    }

    if reservation.status != ReservationStatus::Confirmed {
        let message = ReservationMessage::Confirm {
            reservation_id: req.reservation_id,
            sku_id: reservation.sku_id.clone(),
            payment_txn_id: req.payment_transaction_id,
            shipping_address: req.shipping_address,
            correlation_id: CorrelationId::new_v4(),
        };
        state.log.publish(message).map_err(|_| {
            ReservationError::Queue(format!("partition for sku {} is full", reservation.sku_id))
        })?;

        wait_for_terminal_status(&state, req.reservation_id, ReservationStatus::Confirmed).await?;
    }

    // The cache entry is read-and-clear, so a reservation confirmed by an
    // earlier call may have already had its entry taken; fall back to the
    // durable order row rather than timing out a legitimate idempotent retry.
    let order = match state.cache.take_confirmed_order(req.reservation_id) {
        Some(order) => order,
        None => {
            let order = state
                .repository
                .get_order(req.reservation_id)
                .await?
                .ok_or(ReservationError::Timeout)?;
            ConfirmedOrder {
                order_id: order.order_id,
                total_price: order.total_price,
            }
        }
    };

    Ok(Json(CheckoutResponse {
        order_id: order.order_id,
        reservation_id: req.reservation_id,
        total_price: order.total_price,
        status: "CONFIRMED",
    }))
}

/// Poll `get_reservation` until it reports `expected` (or some other
/// terminal status, which is treated as a failure for the caller's intent)
/// or the attempt budget runs out. Shared by checkout and cancel, both of
/// which route a message through the log and then have nothing to observe
/// except the row itself.
pub(super) async fn wait_for_terminal_status(
    state: &AppState,
    reservation_id: crate::core_types::ReservationId,
    expected: ReservationStatus,
) -> Result<(), ReservationError> {
    for _ in 0..CHECKOUT_POLL_ATTEMPTS {
        if let Some(reservation) = state.repository.get_reservation(reservation_id).await? {
            if reservation.status == expected {
                return Ok(());
            }
            if reservation.status.is_terminal() {
                return Err(ReservationError::CannotConfirm(format!(
                    "{reservation_id} resolved to {:?} instead of {expected:?}",
                    reservation.status
                )));
            }
        }
        tokio::time::sleep(CHECKOUT_POLL_INTERVAL).await;
    }
    Err(ReservationError::Timeout)
}
