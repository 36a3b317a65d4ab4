//! End-to-end pipeline test: Submitter -> partitioned log -> PartitionWorker
//! -> OutcomeWriter -> Poller, against the in-memory `MockStore`.
//!
//! Shaped on the teacher's `internal_transfer` integration tests: build the
//! whole chain with a fake backing store, drive it from the public entry
//! points only, assert on externally observable outcomes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use zero_x_infinity::cache::ResponseCache;
use zero_x_infinity::consumer::PartitionWorker;
use zero_x_infinity::log::PartitionedLog;
use zero_x_infinity::messages::Outcome;
use zero_x_infinity::models::{Inventory, Product};
use zero_x_infinity::outcome::OutcomeWriter;
use zero_x_infinity::poller::Poller;
use zero_x_infinity::repository::mock::MockStore;
use zero_x_infinity::submitter::Submitter;

const SKU: &str = "flash-sku-1";

fn seed(store: &MockStore, total: i64) {
    store.seed_product(
        Product {
            sku_id: SKU.to_string(),
            name: "Limited Widget".to_string(),
            category: "gadgets".to_string(),
            image_url: None,
            base_price: Decimal::new(2999, 2),
            sale_price: Decimal::new(1999, 2),
            event_id: "summer-drop".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        Inventory {
            total,
            reserved: 0,
            sold: 0,
            available: total,
        },
    );
}

struct Harness {
    submitter: Arc<Submitter>,
    _worker: tokio::task::JoinHandle<()>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

fn spin_up(store: Arc<MockStore>) -> Harness {
    let cache = Arc::new(ResponseCache::new(
        Duration::from_secs(120),
        Duration::from_secs(5),
        Duration::from_secs(5),
    ));
    let log = Arc::new(PartitionedLog::new(1, 1024));
    let outcomes = Arc::new(OutcomeWriter::new(cache.clone()));

    let worker = PartitionWorker::new(
        0,
        log.clone(),
        store.clone(),
        outcomes,
        250,
        Duration::from_millis(5),
        Duration::from_secs(120),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    let poller = Poller::new(
        cache.clone(),
        store.clone(),
        100,
        Duration::from_millis(5),
        Duration::from_millis(50),
        5,
    );
    let submitter = Arc::new(Submitter::new(store, cache, log, poller));

    Harness {
        submitter,
        _worker: handle,
        shutdown: shutdown_tx,
    }
}

#[tokio::test]
async fn a_single_buyer_reserves_the_last_unit() {
    let store = Arc::new(MockStore::new());
    seed(&store, 1);
    let harness = spin_up(store);

    let outcome = harness
        .submitter
        .submit_and_wait("alice", SKU, 1)
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Success { .. }));
    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn only_the_first_n_arrivals_win_when_stock_is_scarce() {
    let store = Arc::new(MockStore::new());
    seed(&store, 3);
    let harness = spin_up(store);

    let mut handles = Vec::new();
    for i in 0..5 {
        let submitter = harness.submitter.clone();
        let user = format!("user-{i}");
        handles.push(tokio::spawn(async move {
            submitter.submit_and_wait(&user, SKU, 1).await.unwrap()
        }));
    }

    let mut wins = 0;
    let mut losses = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Outcome::Success { .. } => wins += 1,
            Outcome::Rejected(_) => losses += 1,
            Outcome::Timeout => panic!("request timed out instead of resolving"),
        }
    }

    assert_eq!(wins, 3);
    assert_eq!(losses, 2);
    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn a_second_request_for_the_same_user_and_sku_is_rejected_as_duplicate() {
    let store = Arc::new(MockStore::new());
    seed(&store, 5);
    let harness = spin_up(store);

    let first = harness.submitter.submit_and_wait("bob", SKU, 1).await.unwrap();
    assert!(matches!(first, Outcome::Success { .. }));

    let second = harness.submitter.submit_and_wait("bob", SKU, 1).await.unwrap();
    assert!(matches!(second, Outcome::Rejected(_)));

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn requesting_an_unknown_sku_fails_pre_validation_without_enqueueing() {
    let store = Arc::new(MockStore::new());
    let harness = spin_up(store);

    let result = harness.submitter.submit_and_wait("carol", "no-such-sku", 1).await;
    assert!(result.is_err());

    let _ = harness.shutdown.send(true);
}
