//! Outcome Writer: publishes each processed message's result to the
//! response cache (the only channel the Poller reads) and emits a lifecycle
//! event for non-core consumers.
//!
//! The lifecycle side is grounded on `websocket::ws_broadcast_service`'s
//! `push_event_queue` — a bounded `ArrayQueue` that a downstream service
//! drains independently of the producer. Analytics/notification consumers
//! are out of scope here (§1), so this crate only produces onto that queue;
//! nothing in-tree drains it besides the test below.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::core_types::OrderId;
use crate::messages::{LifecycleEvent, Rejection};
use crate::models::Reservation;

const LIFECYCLE_QUEUE_CAPACITY: usize = 4096;

/// Publishes outcomes and lifecycle events. One instance is shared across
/// every partition worker.
pub struct OutcomeWriter {
    cache: Arc<ResponseCache>,
    lifecycle: Arc<ArrayQueue<LifecycleEvent>>,
}

impl OutcomeWriter {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            cache,
            lifecycle: Arc::new(ArrayQueue::new(LIFECYCLE_QUEUE_CAPACITY)),
        }
    }

    pub fn lifecycle_queue(&self) -> Arc<ArrayQueue<LifecycleEvent>> {
        self.lifecycle.clone()
    }

    /// A reservation was created. Populates `active:{user}:{sku}` and the
    /// current `stock:{sku}` snapshot, then emits a CREATED lifecycle event.
    pub fn publish_reserved(&self, reservation: &Reservation, available_after: i64) {
        self.cache.set_active(
            &reservation.user_id,
            &reservation.sku_id,
            reservation.reservation_id,
        );
        self.cache.set_stock(&reservation.sku_id, available_after);
        info!(
            reservation_id = %reservation.reservation_id,
            sku_id = %reservation.sku_id,
            "reservation created"
        );
        self.emit(LifecycleEvent::Created {
            reservation_id: reservation.reservation_id,
            sku_id: reservation.sku_id.clone(),
            user_id: reservation.user_id.clone(),
            expires_at: reservation.expires_at,
        });
    }

    /// A request was rejected before any row was created (or before a
    /// terminal transition could apply). Populates `reject:{user}:{sku}`.
    pub fn publish_rejected(&self, user_id: &str, sku_id: &str, rejection: Rejection) {
        warn!(user_id, sku_id, code = ?rejection.code, "reservation rejected");
        self.cache.set_reject(user_id, sku_id, rejection);
    }

    pub fn publish_confirmed(
        &self,
        reservation: &Reservation,
        order_id: OrderId,
        total_price: crate::core_types::Money,
        available_after: i64,
    ) {
        self.cache
            .invalidate_active(&reservation.user_id, &reservation.sku_id);
        self.cache.set_purchased(&reservation.user_id, &reservation.sku_id);
        self.cache.set_stock(&reservation.sku_id, available_after);
        self.cache.set_confirmed_order(
            reservation.reservation_id,
            crate::cache::ConfirmedOrder {
                order_id,
                total_price,
            },
        );
        self.emit(LifecycleEvent::Confirmed {
            reservation_id: reservation.reservation_id,
            sku_id: reservation.sku_id.clone(),
            user_id: reservation.user_id.clone(),
            order_id,
            total_price,
        });
    }

    pub fn publish_cancelled(&self, reservation: &Reservation, available_after: i64) {
        self.cache
            .invalidate_active(&reservation.user_id, &reservation.sku_id);
        self.cache.set_stock(&reservation.sku_id, available_after);
        self.emit(LifecycleEvent::Cancelled {
            reservation_id: reservation.reservation_id,
            sku_id: reservation.sku_id.clone(),
            user_id: reservation.user_id.clone(),
        });
    }

    pub fn publish_expired(&self, reservation: &Reservation, available_after: i64) {
        self.cache
            .invalidate_active(&reservation.user_id, &reservation.sku_id);
        self.cache.set_stock(&reservation.sku_id, available_after);
        self.emit(LifecycleEvent::Expired {
            reservation_id: reservation.reservation_id,
            sku_id: reservation.sku_id.clone(),
            user_id: reservation.user_id.clone(),
        });
    }

    fn emit(&self, event: LifecycleEvent) {
        if self.lifecycle.push(event).is_err() {
            warn!("lifecycle queue full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ReservationId;
    use crate::models::ReservationStatus;
    use std::time::Duration;

    fn reservation() -> Reservation {
        Reservation {
            reservation_id: ReservationId::new_v4(),
            user_id: "u1".into(),
            sku_id: "sku1".into(),
            quantity: 1,
            status: ReservationStatus::Reserved,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(120),
            idempotency_key: "u1:sku1".into(),
            created_at: chrono::Utc::now(),
            confirmed_at: None,
            expired_at: None,
            cancelled_at: None,
        }
    }

    fn cache() -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(
            Duration::from_secs(120),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn publish_reserved_populates_active_and_stock_caches() {
        let cache = cache();
        let writer = OutcomeWriter::new(cache.clone());
        let reservation = reservation();
        writer.publish_reserved(&reservation, 998);

        assert_eq!(
            cache.get_active("u1", "sku1"),
            Some(reservation.reservation_id)
        );
        assert_eq!(cache.get_stock("sku1"), Some(998));

        let queue = writer.lifecycle_queue();
        assert!(matches!(queue.pop(), Some(LifecycleEvent::Created { .. })));
    }

    #[test]
    fn publish_confirmed_invalidates_active_and_sets_purchased() {
        let cache = cache();
        let writer = OutcomeWriter::new(cache.clone());
        let reservation = reservation();
        writer.publish_reserved(&reservation, 999);
        writer.publish_confirmed(
            &reservation,
            OrderId::new_v4(),
            rust_decimal::Decimal::new(500, 2),
            999,
        );

        assert_eq!(cache.get_active("u1", "sku1"), None);
        assert_eq!(cache.get_purchased("u1", "sku1"), Some(true));
    }
}
