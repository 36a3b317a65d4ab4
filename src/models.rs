//! Domain entities: Product, Inventory, Reservation, UserPurchase, Order.
//!
//! Reservations and Inventory are mutated exclusively by the batch consumer
//! (`consumer::PartitionWorker`) that owns a given `sku_id`'s partition; every
//! other reader only observes these rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{Money, OrderId, ReservationId, SkuId, UserId};

/// A sellable item in a flash sale. Immutable for the duration of the sale.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub sku_id: SkuId,
    pub name: String,
    pub category: String,
    pub image_url: Option<String>,
    pub base_price: Money,
    pub sale_price: Money,
    pub event_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stock counters for one sku. Invariant:
/// `available + reserved + sold == total` and all three are `>= 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::FromRow)]
pub struct Inventory {
    pub total: i64,
    pub reserved: i64,
    pub sold: i64,
    pub available: i64,
}

impl Inventory {
    /// Sanity-check the invariant this type exists to uphold. Intended for
    /// tests and defensive asserts right after a mutation, not a hot path.
    pub fn is_consistent(&self) -> bool {
        self.available >= 0
            && self.reserved >= 0
            && self.sold >= 0
            && self.available + self.reserved + self.sold == self.total
    }
}

/// Status a reservation can occupy. RESERVED is the only non-terminal state;
/// CONFIRMED / EXPIRED / CANCELLED / FAILED are all terminal (FAILED never
/// has a row — see `ReservationStatus::FAILED`'s doc comment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Reserved,
    Confirmed,
    Expired,
    Cancelled,
    /// Never persisted: a request rejected before a reservation was created
    /// (out of stock, duplicate, etc.) surfaces this status to the caller
    /// only, per §4.2.
    Failed,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }
}

/// A time-bounded hold on one unit of inventory for one user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub user_id: UserId,
    pub sku_id: SkuId,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Reserved && self.expires_at > now
    }
}

/// Recorded exactly once when a reservation transitions to CONFIRMED.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPurchase {
    pub user_id: UserId,
    pub sku_id: SkuId,
    pub order_id: OrderId,
    pub reservation_id: ReservationId,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Order status as seen from the core — the order lifecycle itself
/// (fulfilment, shipping) is an external collaborator's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum OrderStatus {
    PaymentPending,
    Confirmed,
    Fulfilled,
    Cancelled,
}

/// Surface area only: the core treats orders as an external collaborator
/// (spec §6); this struct exists so the checkout/confirm path has somewhere
/// to write the 1:1 row per CONFIRMED reservation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub order_id: OrderId,
    pub reservation_id: ReservationId,
    pub user_id: UserId,
    pub sku_id: SkuId,
    pub quantity: i32,
    pub total_price: Money,
    pub status: OrderStatus,
    pub payment_txn_id: Option<String>,
    pub shipping_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_consistency_holds_after_allocation() {
        let inv = Inventory {
            total: 100,
            reserved: 10,
            sold: 5,
            available: 85,
        };
        assert!(inv.is_consistent());
    }

    #[test]
    fn inventory_consistency_catches_drift() {
        let inv = Inventory {
            total: 100,
            reserved: 10,
            sold: 5,
            available: 84,
        };
        assert!(!inv.is_consistent());
    }

    #[test]
    fn reservation_is_live_requires_unexpired_reserved_status() {
        let now = Utc::now();
        let mut r = Reservation {
            reservation_id: ReservationId::new_v4(),
            user_id: "u1".into(),
            sku_id: "sku1".into(),
            quantity: 1,
            status: ReservationStatus::Reserved,
            expires_at: now + chrono::Duration::seconds(120),
            idempotency_key: "u1:sku1".into(),
            created_at: now,
            confirmed_at: None,
            expired_at: None,
            cancelled_at: None,
        };
        assert!(r.is_live(now));

        r.expires_at = now - chrono::Duration::seconds(1);
        assert!(!r.is_live(now));

        r.expires_at = now + chrono::Duration::seconds(120);
        r.status = ReservationStatus::Confirmed;
        assert!(!r.is_live(now));
    }
}
