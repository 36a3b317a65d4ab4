//! Request ingress: fast-fail pre-validation, then hand off to the ordered
//! log. Mirrors the shape of `gateway/handlers/order.rs::create_order` —
//! validate, enqueue, `push().is_err()` means back off the caller — with the
//! trading-specific checks swapped for the four pre-validation reads from
//! spec §4.1.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::cache::ResponseCache;
use crate::core_types::{idempotency_key, CorrelationId, RequestId};
use crate::error::ReservationError;
use crate::log::PartitionedLog;
use crate::messages::{Outcome, ReservationMessage, ReservationRequest};
use crate::poller::Poller;
use crate::repository::Repository;

/// Fast-fail pre-validation plus log publish. None of these checks are
/// authoritative — the batch consumer re-verifies everything inside its
/// transaction (§4.2 step 3b/c) — they exist purely to reject obviously bad
/// or redundant requests before they ever touch a sku's partition.
pub struct Submitter {
    repository: Arc<dyn Repository>,
    cache: Arc<ResponseCache>,
    log: Arc<PartitionedLog>,
    poller: Poller,
}

impl Submitter {
    pub fn new(
        repository: Arc<dyn Repository>,
        cache: Arc<ResponseCache>,
        log: Arc<PartitionedLog>,
        poller: Poller,
    ) -> Self {
        Self {
            repository,
            cache,
            log,
            poller,
        }
    }

    /// Non-blocking submit: returns once the request is enqueued (or
    /// rejected by pre-validation), without waiting for the consumer.
    #[instrument(skip(self), fields(user_id, sku_id))]
    pub async fn submit(
        &self,
        user_id: &str,
        sku_id: &str,
        quantity: i32,
    ) -> Result<RequestId, ReservationError> {
        self.pre_validate(user_id, sku_id, quantity).await?;

        let request_id = RequestId::new_v4();
        let message = ReservationMessage::Place(ReservationRequest {
            request_id,
            user_id: user_id.to_string(),
            sku_id: sku_id.to_string(),
            quantity,
            idempotency_key: idempotency_key(user_id, sku_id),
            correlation_id: CorrelationId::new_v4(),
            submitted_at: chrono::Utc::now(),
        });

        self.log.publish(message).map_err(|_| {
            ReservationError::Queue(format!("partition for sku {sku_id} is full"))
        })?;

        Ok(request_id)
    }

    /// Blocking variant: submit, then poll the response cache for an
    /// outcome, bounded by the Poller's own timeout (~1s per spec §4.4).
    #[instrument(skip(self), fields(user_id, sku_id))]
    pub async fn submit_and_wait(
        &self,
        user_id: &str,
        sku_id: &str,
        quantity: i32,
    ) -> Result<Outcome, ReservationError> {
        self.submit(user_id, sku_id, quantity).await?;
        Ok(self.poller.wait_for(user_id, sku_id).await)
    }

    async fn pre_validate(
        &self,
        user_id: &str,
        sku_id: &str,
        quantity: i32,
    ) -> Result<(), ReservationError> {
        if quantity != 1 {
            return Err(ReservationError::InvalidRequest(
                "quantity must be exactly 1".to_string(),
            ));
        }

        if self.repository.get_product(sku_id).await?.is_none() {
            return Err(ReservationError::ProductNotFound(sku_id.to_string()));
        }

        if self.user_has_purchased(user_id, sku_id).await? {
            return Err(ReservationError::UserAlreadyPurchased);
        }

        if self.user_has_active_hold(user_id, sku_id).await? {
            return Err(ReservationError::UserHasActiveReservation);
        }

        if let Some(available) = self.cache.get_stock(sku_id) {
            if available < quantity as i64 {
                return Err(ReservationError::OutOfStock);
            }
        }

        Ok(())
    }

    async fn user_has_purchased(
        &self,
        user_id: &str,
        sku_id: &str,
    ) -> Result<bool, ReservationError> {
        if let Some(purchased) = self.cache.get_purchased(user_id, sku_id) {
            return Ok(purchased);
        }
        let purchased = self.repository.has_user_purchased(user_id, sku_id).await?;
        if purchased {
            self.cache.set_purchased(user_id, sku_id);
        }
        Ok(purchased)
    }

    async fn user_has_active_hold(
        &self,
        user_id: &str,
        sku_id: &str,
    ) -> Result<bool, ReservationError> {
        if self.cache.get_active(user_id, sku_id).is_some() {
            return Ok(true);
        }
        let key = idempotency_key(user_id, sku_id);
        let live = self
            .repository
            .find_reservation_by_idempotency_key(&key)
            .await?
            .is_some_and(|r| r.is_live(chrono::Utc::now()));
        Ok(live)
    }
}

/// Hard per-call timeout applied around each pre-validation read (spec §5:
/// "hard timeout on each cache/DB call; on failure treat as cache miss and
/// proceed"). Not wired into `pre_validate` directly since `Repository` calls
/// here are in-process/mock in tests; a deployment wires this at the
/// `PgRepository` call sites via `tokio::time::timeout`.
pub const PRE_VALIDATION_TIMEOUT: Duration = Duration::from_millis(50);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Inventory, Product};
    use crate::poller::Poller;
    use crate::repository::mock::MockStore;
    use std::time::Duration as StdDuration;

    fn product(sku_id: &str) -> Product {
        Product {
            sku_id: sku_id.to_string(),
            name: "Widget".into(),
            category: "gadgets".into(),
            image_url: None,
            base_price: rust_decimal::Decimal::new(1000, 2),
            sale_price: rust_decimal::Decimal::new(500, 2),
            event_id: "event1".into(),
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn harness() -> (Arc<MockStore>, Arc<ResponseCache>, Arc<PartitionedLog>) {
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(ResponseCache::new(
            StdDuration::from_secs(120),
            StdDuration::from_secs(5),
            StdDuration::from_secs(5),
        ));
        let log = Arc::new(PartitionedLog::new(4, 64));
        (store, cache, log)
    }

    fn submitter(
        store: Arc<MockStore>,
        cache: Arc<ResponseCache>,
        log: Arc<PartitionedLog>,
    ) -> Submitter {
        let poller = Poller::new(
            cache.clone(),
            store.clone(),
            10,
            StdDuration::from_millis(1),
            StdDuration::from_millis(5),
            3,
        );
        Submitter::new(store, cache, log, poller)
    }

    #[tokio::test]
    async fn rejects_quantity_other_than_one() {
        let (store, cache, log) = harness();
        store.seed_product(
            product("sku1"),
            Inventory {
                total: 10,
                reserved: 0,
                sold: 0,
                available: 10,
            },
        );
        let sub = submitter(store, cache, log);
        let err = sub.submit("u1", "sku1", 2).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn enqueues_a_valid_request_without_blocking() {
        let (store, cache, log) = harness();
        store.seed_product(
            product("sku1"),
            Inventory {
                total: 10,
                reserved: 0,
                sold: 0,
                available: 10,
            },
        );
        let sub = submitter(store, cache.clone(), log.clone());
        let request_id = sub.submit("u1", "sku1", 1).await.unwrap();
        assert_ne!(request_id, uuid::Uuid::nil());
        assert_eq!(log.partition(log.partition_for("sku1")).len(), 1);
    }

    #[tokio::test]
    async fn cached_stock_of_zero_fails_fast_without_enqueueing() {
        let (store, cache, log) = harness();
        store.seed_product(
            product("sku1"),
            Inventory {
                total: 10,
                reserved: 10,
                sold: 0,
                available: 0,
            },
        );
        cache.set_stock("sku1", 0);
        let sub = submitter(store, cache, log.clone());
        let err = sub.submit("u1", "sku1", 1).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::OutOfStock);
        assert_eq!(log.partition(log.partition_for("sku1")).len(), 0);
    }
}
