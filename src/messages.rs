//! Inter-component message types.
//!
//! These are the payloads that travel on the partitioned log (`log`), plus
//! the outcome/lifecycle types the Outcome Writer hands back across the
//! cache boundary. Everything here is `Clone` because a batch consumer needs
//! to hold on to a message after it has been grouped/deduplicated while the
//! original queue slot is reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{CorrelationId, Money, OrderId, ReservationId, RequestId, SkuId, UserId};
use crate::error::ErrorCode;
use crate::models::ReservationStatus;

/// A pre-validated request to place a hold, as built by the Submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub request_id: RequestId,
    pub user_id: UserId,
    pub sku_id: SkuId,
    pub quantity: i32,
    pub idempotency_key: String,
    pub correlation_id: CorrelationId,
    pub submitted_at: DateTime<Utc>,
}

/// Everything that flows through a sku's partition. `Place` comes from the
/// Submitter; `Confirm`/`Cancel` come from the checkout/cancel API surface;
/// `Expire` comes from the Expiry Sweeper. All four are handled by the same
/// single writer for a given `sku_id`, which is what makes their relative
/// ordering race-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReservationMessage {
    Place(ReservationRequest),
    Confirm {
        reservation_id: ReservationId,
        sku_id: SkuId,
        payment_txn_id: String,
        shipping_address: Option<String>,
        correlation_id: CorrelationId,
    },
    Cancel {
        reservation_id: ReservationId,
        sku_id: SkuId,
        correlation_id: CorrelationId,
    },
    Expire {
        reservation_id: ReservationId,
        sku_id: SkuId,
        correlation_id: CorrelationId,
    },
}

impl ReservationMessage {
    /// The partition key every variant routes on.
    pub fn sku_id(&self) -> &str {
        match self {
            ReservationMessage::Place(req) => &req.sku_id,
            ReservationMessage::Confirm { sku_id, .. }
            | ReservationMessage::Cancel { sku_id, .. }
            | ReservationMessage::Expire { sku_id, .. } => sku_id,
        }
    }
}

/// The result the Poller is waiting to observe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Outcome {
    Success { reservation_id: ReservationId },
    Rejected(Rejection),
    Timeout,
}

/// A rejection as published to the `reject:{user}:{sku}` cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

/// Published on the lifecycle topic for non-core consumers (analytics,
/// notifications). Not required for core correctness — see §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Created {
        reservation_id: ReservationId,
        sku_id: SkuId,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    },
    Confirmed {
        reservation_id: ReservationId,
        sku_id: SkuId,
        user_id: UserId,
        order_id: OrderId,
        total_price: Money,
    },
    Expired {
        reservation_id: ReservationId,
        sku_id: SkuId,
        user_id: UserId,
    },
    Cancelled {
        reservation_id: ReservationId,
        sku_id: SkuId,
        user_id: UserId,
    },
}

impl LifecycleEvent {
    pub fn status(&self) -> ReservationStatus {
        match self {
            LifecycleEvent::Created { .. } => ReservationStatus::Reserved,
            LifecycleEvent::Confirmed { .. } => ReservationStatus::Confirmed,
            LifecycleEvent::Expired { .. } => ReservationStatus::Expired,
            LifecycleEvent::Cancelled { .. } => ReservationStatus::Cancelled,
        }
    }
}
