//! Expiry Sweeper: periodic scan that routes EXPIRE messages for
//! past-due RESERVED holds back through the single-writer partition.
//!
//! Shaped directly on `transfer::worker::RecoveryWorker` — a `run()` loop
//! that scans on a fixed interval and logs/continues past a failed cycle
//! rather than aborting — with "stale transfers" replaced by "RESERVED rows
//! past `expires_at`" and "resume" replaced by "re-route through the log".

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::core_types::CorrelationId;
use crate::error::ReservationError;
use crate::log::PartitionedLog;
use crate::messages::ReservationMessage;
use crate::repository::Repository;

const EXPIRE_SCAN_LIMIT: i64 = 1000;

pub struct ExpirySweeper {
    repository: Arc<dyn Repository>,
    log: Arc<PartitionedLog>,
    scan_interval: Duration,
}

impl ExpirySweeper {
    pub fn new(repository: Arc<dyn Repository>, log: Arc<PartitionedLog>, scan_interval: Duration) -> Self {
        Self {
            repository,
            log,
            scan_interval,
        }
    }

    /// Runs forever, periodically scanning for and re-routing stale holds.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            "starting expiry sweeper"
        );
        loop {
            match self.sweep_once().await {
                Ok(count) if count > 0 => info!(count, "swept expired reservations"),
                Ok(_) => {}
                Err(err) => error!(error = %err, "expiry sweep failed"),
            }
            tokio::time::sleep(self.scan_interval).await;
        }
    }

    /// One scan-and-route cycle. Returns the number of EXPIRE messages
    /// enqueued.
    pub async fn sweep_once(&self) -> Result<usize, ReservationError> {
        let expired = self
            .repository
            .find_expired_reservations(chrono::Utc::now(), EXPIRE_SCAN_LIMIT)
            .await?;

        let mut enqueued = 0;
        for reservation in &expired {
            let message = ReservationMessage::Expire {
                reservation_id: reservation.reservation_id,
                sku_id: reservation.sku_id.clone(),
                correlation_id: CorrelationId::new_v4(),
            };
            if self.log.publish(message).is_err() {
                error!(
                    reservation_id = %reservation.reservation_id,
                    "partition full, expire message dropped; will be re-swept next cycle"
                );
                continue;
            }
            enqueued += 1;
        }

        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Inventory, Product};
    use crate::repository::mock::MockStore;

    #[tokio::test]
    async fn sweep_enqueues_one_expire_message_per_stale_reservation() {
        let store = Arc::new(MockStore::new());
        store.seed_product(
            Product {
                sku_id: "sku1".into(),
                name: "Widget".into(),
                category: "gadgets".into(),
                image_url: None,
                base_price: rust_decimal::Decimal::new(1000, 2),
                sale_price: rust_decimal::Decimal::new(500, 2),
                event_id: "event1".into(),
                is_active: true,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
            Inventory {
                total: 1,
                reserved: 1,
                sold: 0,
                available: 0,
            },
        );
        let grant = crate::repository::Allocation {
            reservation_id: crate::core_types::ReservationId::new_v4(),
            user_id: "u1".into(),
            sku_id: "sku1".into(),
            quantity: 1,
            idempotency_key: "u1:sku1".into(),
            expires_at: chrono::Utc::now() - chrono::Duration::seconds(1),
        };
        store.apply_allocation("sku1", &[grant]).await.unwrap();

        let log = Arc::new(PartitionedLog::new(2, 16));
        let sweeper = ExpirySweeper::new(store, log.clone(), Duration::from_secs(10));
        let count = sweeper.sweep_once().await.unwrap();

        assert_eq!(count, 1);
        let partition = log.partition(log.partition_for("sku1"));
        assert!(matches!(partition.pop(), Some(ReservationMessage::Expire { .. })));
    }
}
