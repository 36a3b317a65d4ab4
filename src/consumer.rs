//! Partitioned batch consumer: the single writer for every sku routed to
//! its partition.
//!
//! Grounded on the one-task-per-partition ownership pattern in
//! `websocket::ws_broadcast_service::WsService` (one task, one queue, no
//! shared mutable state across tasks) and on `pipeline_mt`'s batch-drain
//! loop shape, adapted to spec §4.2's exact steps: pull, group, dedupe,
//! allocate, transact, commit, ack, publish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument};

use crate::core_types::{OrderId, ReservationId};
use crate::error::ReservationError;
use crate::log::{recv_batch, PartitionedLog};
use crate::messages::{ReservationMessage, ReservationRequest};
use crate::models::Reservation;
use crate::outcome::OutcomeWriter;
use crate::repository::{Allocation, Repository};

/// One cooperative worker, owning exactly one partition of the log. No two
/// `PartitionWorker`s ever touch the same partition, so within a partition
/// there is no contention on Inventory/Reservation rows for its skus.
pub struct PartitionWorker {
    partition_index: usize,
    log: Arc<PartitionedLog>,
    repository: Arc<dyn Repository>,
    outcomes: Arc<OutcomeWriter>,
    batch_size: usize,
    batch_wait: Duration,
    hold_duration: chrono::Duration,
}

impl PartitionWorker {
    pub fn new(
        partition_index: usize,
        log: Arc<PartitionedLog>,
        repository: Arc<dyn Repository>,
        outcomes: Arc<OutcomeWriter>,
        batch_size: usize,
        batch_wait: Duration,
        hold_duration: Duration,
    ) -> Self {
        Self {
            partition_index,
            log,
            repository,
            outcomes,
            batch_size,
            batch_wait,
            hold_duration: chrono::Duration::from_std(hold_duration)
                .unwrap_or(chrono::Duration::seconds(120)),
        }
    }

    /// Runs until the given shutdown signal resolves. Intended to be spawned
    /// as its own tokio task, one per partition.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let queue = self.log.partition(self.partition_index);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(partition = self.partition_index, "partition worker shutting down");
                        return;
                    }
                }
                batch = recv_batch(&queue, self.batch_size, self.batch_wait) => {
                    if batch.is_empty() {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        continue;
                    }
                    self.process_batch(batch).await;
                }
            }
        }
    }

    #[instrument(skip(self, batch), fields(partition = self.partition_index, batch_len = batch.len()))]
    async fn process_batch(&self, batch: Vec<ReservationMessage>) {
        let mut by_sku: HashMap<String, Vec<ReservationMessage>> = HashMap::new();
        for message in batch {
            by_sku
                .entry(message.sku_id().to_string())
                .or_default()
                .push(message);
        }

        for (sku_id, messages) in by_sku {
            self.process_sku_group(&sku_id, messages).await;
        }
    }

    async fn process_sku_group(&self, sku_id: &str, messages: Vec<ReservationMessage>) {
        let mut place_requests = Vec::new();
        for message in messages {
            match message {
                ReservationMessage::Place(request) => place_requests.push(request),
                ReservationMessage::Confirm {
                    reservation_id,
                    payment_txn_id,
                    shipping_address,
                    ..
                } => self.apply_confirm(reservation_id, payment_txn_id, shipping_address).await,
                ReservationMessage::Cancel { reservation_id, .. } => {
                    self.apply_cancel(reservation_id).await
                }
                ReservationMessage::Expire { reservation_id, .. } => {
                    self.apply_expire(reservation_id).await
                }
            }
        }

        if place_requests.is_empty() {
            return;
        }

        if let Err(err) = self.apply_placements(sku_id, place_requests).await {
            error!(sku_id, error = %err, "failed to apply placement batch");
        }
    }

    async fn apply_placements(
        &self,
        sku_id: &str,
        requests: Vec<ReservationRequest>,
    ) -> Result<(), ReservationError> {
        // 3a. Deduplicate by idempotency_key within the batch.
        let mut seen = std::collections::HashSet::new();
        let mut deduped = Vec::with_capacity(requests.len());
        for request in requests {
            if !seen.insert(request.idempotency_key.clone()) {
                self.outcomes.publish_rejected(
                    &request.user_id,
                    sku_id,
                    ReservationError::DuplicateRequest(request.idempotency_key.clone())
                        .to_rejection(),
                );
                continue;
            }
            deduped.push(request);
        }

        // 3b/3c. Authoritative idempotency + user-uniqueness check against
        // the durable store.
        let mut candidates = Vec::with_capacity(deduped.len());
        for request in deduped {
            if let Some(existing) = self
                .repository
                .find_reservation_by_idempotency_key(&request.idempotency_key)
                .await?
            {
                if existing.is_live(chrono::Utc::now()) {
                    self.outcomes.publish_reserved(&existing, self.current_available(sku_id).await?);
                    continue;
                }
            }
            candidates.push(request);
        }

        if candidates.is_empty() {
            return Ok(());
        }

        let inventory = self
            .repository
            .get_inventory(sku_id)
            .await?
            .ok_or_else(|| ReservationError::InvalidRequest(format!("unknown sku {sku_id}")))?;

        // 3d. Allocate in arrival order, reject the remainder OUT_OF_STOCK.
        let (winners, losers) = allocate(&candidates, inventory.available);

        let now = chrono::Utc::now();
        let grants: Vec<Allocation> = winners
            .iter()
            .map(|request| Allocation {
                reservation_id: ReservationId::new_v4(),
                user_id: request.user_id.clone(),
                sku_id: request.sku_id.clone(),
                quantity: request.quantity,
                idempotency_key: request.idempotency_key.clone(),
                expires_at: now + self.hold_duration,
            })
            .collect();

        let reservations = self.repository.apply_allocation(sku_id, &grants).await?;
        let available_after = self.current_available(sku_id).await?;

        for reservation in &reservations {
            self.outcomes.publish_reserved(reservation, available_after);
        }

        for request in losers {
            self.outcomes.publish_rejected(
                &request.user_id,
                sku_id,
                ReservationError::OutOfStock.to_rejection(),
            );
        }

        Ok(())
    }

    async fn apply_confirm(
        &self,
        reservation_id: ReservationId,
        payment_txn_id: String,
        shipping_address: Option<String>,
    ) {
        // Repository::confirm_reservation is idempotent: a repeat CONFIRM on
        // an already-CONFIRMED id returns its existing order rather than
        // erroring (spec §4.2/§8), so `order.order_id` - not the freshly
        // minted id below - is always the order the caller should learn
        // about.
        let order_id = OrderId::new_v4();
        match self.repository.confirm_reservation(reservation_id, order_id).await {
            Ok((reservation, mut order)) => {
                if order.order_id == order_id {
                    order.payment_txn_id = Some(payment_txn_id);
                    order.shipping_address = shipping_address;
                }
                let available_after = self
                    .current_available(&reservation.sku_id)
                    .await
                    .unwrap_or(0);
                self.outcomes.publish_confirmed(
                    &reservation,
                    order.order_id,
                    order.total_price,
                    available_after,
                );
            }
            Err(err) => error!(reservation_id = %reservation_id, error = %err, "confirm failed"),
        }
    }

    async fn apply_cancel(&self, reservation_id: ReservationId) {
        match self.repository.cancel_reservation(reservation_id).await {
            Ok(reservation) => {
                let available_after = self
                    .current_available(&reservation.sku_id)
                    .await
                    .unwrap_or(0);
                self.outcomes.publish_cancelled(&reservation, available_after);
            }
            Err(err) => error!(reservation_id = %reservation_id, error = %err, "cancel failed"),
        }
    }

    async fn apply_expire(&self, reservation_id: ReservationId) {
        match self.repository.expire_reservation(reservation_id).await {
            Ok(reservation) if reservation.status == crate::models::ReservationStatus::Expired => {
                let available_after = self
                    .current_available(&reservation.sku_id)
                    .await
                    .unwrap_or(0);
                self.outcomes.publish_expired(&reservation, available_after);
            }
            Ok(_already_terminal) => {}
            Err(err) => error!(reservation_id = %reservation_id, error = %err, "expire failed"),
        }
    }

    async fn current_available(&self, sku_id: &str) -> Result<i64, ReservationError> {
        Ok(self
            .repository
            .get_inventory(sku_id)
            .await?
            .map(|inv| inv.available)
            .unwrap_or(0))
    }
}

/// Pure allocation function (spec §4.2 step 3d / §8's arrival-order boundary
/// property): given requests in arrival order and the stock currently
/// `available`, returns `(winners, losers)` where winners are exactly the
/// first `min(available, requests.len())` requests in the input order, one
/// unit each (quantity is always 1 per spec §3).
pub fn allocate<'a>(
    requests: &'a [ReservationRequest],
    available: i64,
) -> (Vec<&'a ReservationRequest>, Vec<&'a ReservationRequest>) {
    let winner_count = available.max(0) as usize;
    let (winners, losers) = requests.split_at(winner_count.min(requests.len()));
    (winners.iter().collect(), losers.iter().collect())
}
