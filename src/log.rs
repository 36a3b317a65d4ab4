//! Partitioned ordered message log.
//!
//! Plays the role of spec §2's Kafka-style `reservation-requests` topic:
//! every message is keyed by `sku_id` and routed to exactly one partition,
//! so a single consumer task owns (and therefore serializes) all messages
//! for a given sku. Implemented with one `crossbeam_queue::ArrayQueue` per
//! partition — the same bounded lock-free queue `pipeline::MultiThreadQueues`
//! uses for its inter-stage transport, with a `push().is_err()` ⇒
//! backpressure convention lifted straight from
//! `gateway/handlers/order.rs::create_order`.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use rustc_hash::FxHasher;

use crate::messages::ReservationMessage;

/// An ordered log partitioned by `sku_id`. Retention/at-least-once delivery
/// guarantees from spec §6 are the operator's concern when this is backed by
/// a real broker; in-process, "retention" is simply "not yet popped".
pub struct PartitionedLog {
    partitions: Vec<Arc<ArrayQueue<ReservationMessage>>>,
}

impl PartitionedLog {
    pub fn new(partition_count: usize, partition_capacity: usize) -> Self {
        assert!(partition_count > 0, "a log needs at least one partition");
        let partitions = (0..partition_count)
            .map(|_| Arc::new(ArrayQueue::new(partition_capacity)))
            .collect();
        Self { partitions }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Deterministic partition assignment for a sku — every message for the
    /// same sku always lands on the same partition, which is the whole
    /// point: it gives that sku exactly one writer.
    pub fn partition_for(&self, sku_id: &str) -> usize {
        let mut hasher = FxHasher::default();
        sku_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions.len()
    }

    /// Handle to one partition's queue, for a consumer task to own.
    pub fn partition(&self, index: usize) -> Arc<ArrayQueue<ReservationMessage>> {
        self.partitions[index].clone()
    }

    /// Publish a message onto the partition its `sku_id` hashes to. Returns
    /// the message back on failure (partition full) so the caller can
    /// surface `PROCESSING_ERROR` / 503 without losing it silently.
    pub fn publish(&self, message: ReservationMessage) -> Result<(), ReservationMessage> {
        let partition = self.partition_for(message.sku_id());
        self.partitions[partition].push(message)
    }
}

/// Drain up to `batch_size` messages from a partition, waiting up to
/// `batch_wait` to let a short burst accumulate (spec §4.2 step 1: "Pull up
/// to B=250 messages ... with a soft cap of ~10ms waiting").
pub async fn recv_batch(
    queue: &ArrayQueue<ReservationMessage>,
    batch_size: usize,
    batch_wait: Duration,
) -> Vec<ReservationMessage> {
    let deadline = Instant::now() + batch_wait;
    let mut batch = Vec::with_capacity(batch_size.min(queue.capacity()));

    loop {
        while batch.len() < batch_size {
            match queue.pop() {
                Some(msg) => batch.push(msg),
                None => break,
            }
        }

        if batch.len() >= batch_size || Instant::now() >= deadline {
            break;
        }

        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{idempotency_key, RequestId, CorrelationId};
    use crate::messages::ReservationRequest;
    use chrono::Utc;

    fn place(sku_id: &str) -> ReservationMessage {
        ReservationMessage::Place(ReservationRequest {
            request_id: RequestId::new_v4(),
            user_id: "u1".into(),
            sku_id: sku_id.into(),
            quantity: 1,
            idempotency_key: idempotency_key("u1", sku_id),
            correlation_id: CorrelationId::new_v4(),
            submitted_at: Utc::now(),
        })
    }

    #[test]
    fn same_sku_always_routes_to_the_same_partition() {
        let log = PartitionedLog::new(8, 16);
        let p1 = log.partition_for("sku-42");
        let p2 = log.partition_for("sku-42");
        assert_eq!(p1, p2);
    }

    #[tokio::test]
    async fn recv_batch_drains_available_messages_without_waiting_full_deadline() {
        let log = PartitionedLog::new(1, 16);
        for i in 0..5 {
            log.publish(place(&format!("sku-{i}"))).unwrap();
        }
        let queue = log.partition(0);
        let started = Instant::now();
        let batch = recv_batch(&queue, 250, Duration::from_millis(200)).await;
        assert_eq!(batch.len(), 5);
        assert!(started.elapsed() < Duration::from_millis(190));
    }

    #[tokio::test]
    async fn recv_batch_respects_batch_size_cap() {
        let log = PartitionedLog::new(1, 64);
        for i in 0..10 {
            log.publish(place(&format!("sku-{i}"))).unwrap();
        }
        let queue = log.partition(0);
        let batch = recv_batch(&queue, 4, Duration::from_millis(5)).await;
        assert_eq!(batch.len(), 4);
    }
}
