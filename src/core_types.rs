//! Core types used throughout the system
//!
//! These are fundamental type aliases and opaque IDs used by all modules.
//! They provide semantic meaning and enable future type evolution.

use uuid::Uuid;

/// SKU identifier — opaque string, primary key for `products`/`inventory`.
pub type SkuId = String;

/// User identifier — opaque string, as delivered by the external auth collaborator.
pub type UserId = String;

/// Reservation identifier — a UUID minted when a hold is created.
pub type ReservationId = Uuid;

/// Order identifier — a UUID minted by the (external) checkout collaborator.
pub type OrderId = Uuid;

/// Request identifier — a UUID minted per `Submit` call, returned to the caller
/// immediately and used to correlate the eventual outcome.
pub type RequestId = Uuid;

/// Correlation identifier threaded through logs/events for a single request.
pub type CorrelationId = Uuid;

/// Fixed-point monetary amount.
pub type Money = rust_decimal::Decimal;

/// Build the idempotency key for a (user, sku) pair.
///
/// Kept stable across a reservation's lifetime (see DESIGN.md "Idempotency
/// key rotation"): status plus `expires_at`, not key rotation, is what allows
/// a user to re-reserve after a hold terminates.
pub fn idempotency_key(user_id: &str, sku_id: &str) -> String {
    format!("{}:{}", user_id, sku_id)
}
