//! Poller: the cooperative wait loop a synchronous API handler uses to
//! block on an outcome the batch consumer hasn't published yet.
//!
//! Same shape as the teacher's blocking-wait-over-cheap-reads pattern in
//! `internal_transfer`'s status polling, but tuned to the exact backoff
//! ladder spec §4.4 calls for: 5ms flat for the first few attempts (matched
//! to the batch consumer's ~10ms rhythm), then doubling, capped at 100ms.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::cache::ResponseCache;
use crate::core_types::idempotency_key;
use crate::messages::Outcome;
use crate::repository::Repository;

/// Per-request wait loop. One instance is shared across requests; all state
/// it touches (the response cache, the repository) is itself shared.
pub struct Poller {
    cache: Arc<ResponseCache>,
    repository: Arc<dyn Repository>,
    max_attempts: u32,
    initial_interval: Duration,
    max_interval: Duration,
    backoff_after_attempts: u32,
}

impl Poller {
    pub fn new(
        cache: Arc<ResponseCache>,
        repository: Arc<dyn Repository>,
        max_attempts: u32,
        initial_interval: Duration,
        max_interval: Duration,
        backoff_after_attempts: u32,
    ) -> Self {
        Self {
            cache,
            repository,
            max_attempts,
            initial_interval,
            max_interval,
            backoff_after_attempts,
        }
    }

    pub fn from_config(
        cache: Arc<ResponseCache>,
        repository: Arc<dyn Repository>,
        config: &crate::config::AppConfig,
    ) -> Self {
        Self::new(
            cache,
            repository,
            config.poll_max_attempts,
            config.poll_initial_interval,
            config.poll_max_interval,
            config.poll_backoff_after_attempts,
        )
    }

    /// Block (cooperatively) until an outcome for `(user_id, sku_id)`
    /// appears in the response cache, or the attempt budget is exhausted.
    #[instrument(skip(self), fields(user_id, sku_id))]
    pub async fn wait_for(&self, user_id: &str, sku_id: &str) -> Outcome {
        for attempt in 0..self.max_attempts {
            if let Some(rejection) = self.cache.take_reject(user_id, sku_id) {
                return Outcome::Rejected(rejection);
            }

            if let Some(reservation_id) = self.cache.get_active(user_id, sku_id) {
                let confirmed_reserved = self
                    .repository
                    .get_reservation(reservation_id)
                    .await
                    .ok()
                    .flatten()
                    .is_some_and(|r| r.is_live(chrono::Utc::now()));
                if confirmed_reserved {
                    return Outcome::Success { reservation_id };
                }
            }

            tokio::time::sleep(self.interval_for(attempt)).await;
        }

        let _ = idempotency_key(user_id, sku_id);
        Outcome::Timeout
    }

    /// 5ms for the first `backoff_after_attempts` attempts, then doubling,
    /// capped at `max_interval`.
    fn interval_for(&self, attempt: u32) -> Duration {
        if attempt < self.backoff_after_attempts {
            return self.initial_interval;
        }
        let doublings = attempt - self.backoff_after_attempts + 1;
        let scaled = self.initial_interval.saturating_mul(1 << doublings.min(16));
        scaled.min(self.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::messages::Rejection;
    use crate::repository::mock::MockStore;

    fn poller(cache: Arc<ResponseCache>) -> Poller {
        Poller::new(
            cache,
            Arc::new(MockStore::new()),
            100,
            Duration::from_millis(5),
            Duration::from_millis(100),
            5,
        )
    }

    #[test]
    fn interval_stays_flat_for_first_backoff_window() {
        let p = poller(Arc::new(ResponseCache::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )));
        for attempt in 0..5 {
            assert_eq!(p.interval_for(attempt), Duration::from_millis(5));
        }
    }

    #[test]
    fn interval_doubles_then_caps() {
        let p = poller(Arc::new(ResponseCache::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )));
        assert_eq!(p.interval_for(5), Duration::from_millis(10));
        assert_eq!(p.interval_for(6), Duration::from_millis(20));
        assert_eq!(p.interval_for(7), Duration::from_millis(40));
        assert_eq!(p.interval_for(8), Duration::from_millis(80));
        assert_eq!(p.interval_for(9), Duration::from_millis(100));
        assert_eq!(p.interval_for(20), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn wait_for_returns_rejection_immediately_when_cached() {
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        ));
        cache.set_reject(
            "u1",
            "sku1",
            Rejection {
                code: ErrorCode::OutOfStock,
                message: "no stock".into(),
            },
        );
        let p = poller(cache);
        match p.wait_for("u1", "sku1").await {
            Outcome::Rejected(rejection) => assert_eq!(rejection.code, ErrorCode::OutOfStock),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_for_times_out_when_nothing_is_published() {
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        ));
        let p = Poller::new(
            cache,
            Arc::new(MockStore::new()),
            3,
            Duration::from_millis(1),
            Duration::from_millis(2),
            1,
        );
        assert!(matches!(p.wait_for("u1", "sku1").await, Outcome::Timeout));
    }
}
