//! Response cache — the sole signal the Poller uses to observe an outcome,
//! plus the availability/purchase caches the Submitter's pre-validation
//! reads from.
//!
//! Built the same way `api_auth::ts_store::TsStore` builds its nonce store:
//! a `DashMap` for thread-safe concurrent access, no external cache
//! dependency. Unlike `TsStore`, every entry here carries a TTL, checked
//! lazily on read (an entry found expired is removed and treated as a
//! miss) — the same "self-heals" tolerance spec §5 calls for on `stock:{sku}`.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::core_types::{Money, OrderId, ReservationId, SkuId, UserId};
use crate::messages::Rejection;

/// Snapshot of a just-confirmed order, cached so the checkout handler (which
/// submitted a `Confirm` message onto the log and has no other way to learn
/// the outcome) can poll for it without a dedicated query path back to the
/// database.
#[derive(Debug, Clone)]
pub struct ConfirmedOrder {
    pub order_id: OrderId,
    pub total_price: Money,
}

/// TTL for `purchased:{user}:{sku}`. Long-lived: once a user has purchased a
/// sku that fact essentially never needs re-checking, but spec §6 still
/// calls it a cache entry with a TTL rather than a permanent fact, so a
/// missed invalidation can't wedge the system forever.
const PURCHASED_CACHE_TTL: Duration = Duration::from_secs(3600);

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

fn key(user_id: &str, sku_id: &str) -> (UserId, SkuId) {
    (user_id.to_string(), sku_id.to_string())
}

/// In-process TTL cache backing the four key families from spec §6:
/// `active:{user}:{sku}`, `reject:{user}:{sku}`, `stock:{sku}`,
/// `purchased:{user}:{sku}`.
pub struct ResponseCache {
    active: DashMap<(UserId, SkuId), Entry<ReservationId>>,
    reject: DashMap<(UserId, SkuId), Entry<Rejection>>,
    stock: DashMap<SkuId, Entry<i64>>,
    purchased: DashMap<(UserId, SkuId), Entry<bool>>,
    confirmed_order: DashMap<ReservationId, Entry<ConfirmedOrder>>,
    active_ttl: Duration,
    reject_ttl: Duration,
    stock_ttl: Duration,
}

impl ResponseCache {
    pub fn new(active_ttl: Duration, reject_ttl: Duration, stock_ttl: Duration) -> Self {
        Self {
            active: DashMap::new(),
            reject: DashMap::new(),
            stock: DashMap::new(),
            purchased: DashMap::new(),
            confirmed_order: DashMap::new(),
            active_ttl,
            reject_ttl,
            stock_ttl,
        }
    }

    // -- active:{user}:{sku} -------------------------------------------------

    pub fn set_active(&self, user_id: &str, sku_id: &str, reservation_id: ReservationId) {
        self.active
            .insert(key(user_id, sku_id), Entry::new(reservation_id, self.active_ttl));
    }

    pub fn get_active(&self, user_id: &str, sku_id: &str) -> Option<ReservationId> {
        get_live(&self.active, &key(user_id, sku_id))
    }

    pub fn invalidate_active(&self, user_id: &str, sku_id: &str) {
        self.active.remove(&key(user_id, sku_id));
    }

    // -- reject:{user}:{sku} -------------------------------------------------

    pub fn set_reject(&self, user_id: &str, sku_id: &str, rejection: Rejection) {
        self.reject
            .insert(key(user_id, sku_id), Entry::new(rejection, self.reject_ttl));
    }

    /// Read-and-clear: the Poller consumes a rejection exactly once.
    pub fn take_reject(&self, user_id: &str, sku_id: &str) -> Option<Rejection> {
        let (_, entry) = self.reject.remove(&key(user_id, sku_id))?;
        entry.is_live().then_some(entry.value)
    }

    // -- stock:{sku} ----------------------------------------------------------

    pub fn set_stock(&self, sku_id: &str, available: i64) {
        self.stock
            .insert(sku_id.to_string(), Entry::new(available, self.stock_ttl));
    }

    pub fn get_stock(&self, sku_id: &str) -> Option<i64> {
        get_live(&self.stock, &sku_id.to_string())
    }

    // -- purchased:{user}:{sku} ------------------------------------------------

    pub fn set_purchased(&self, user_id: &str, sku_id: &str) {
        self.purchased
            .insert(key(user_id, sku_id), Entry::new(true, PURCHASED_CACHE_TTL));
    }

    pub fn get_purchased(&self, user_id: &str, sku_id: &str) -> Option<bool> {
        get_live(&self.purchased, &key(user_id, sku_id))
    }

    // -- confirmed order snapshot, keyed by reservation_id --------------------

    pub fn set_confirmed_order(&self, reservation_id: ReservationId, order: ConfirmedOrder) {
        self.confirmed_order
            .insert(reservation_id, Entry::new(order, self.active_ttl));
    }

    /// Read-and-clear: the checkout handler consumes this exactly once.
    pub fn take_confirmed_order(&self, reservation_id: ReservationId) -> Option<ConfirmedOrder> {
        let (_, entry) = self.confirmed_order.remove(&reservation_id)?;
        entry.is_live().then_some(entry.value)
    }
}

fn get_live<K, V>(map: &DashMap<K, Entry<V>>, k: &K) -> Option<V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    let live = map.get(k).filter(|e| e.is_live()).map(|e| e.value.clone());
    if live.is_none() {
        map.remove(k);
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn cache() -> ResponseCache {
        ResponseCache::new(
            Duration::from_secs(120),
            Duration::from_millis(20),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn active_round_trips_until_ttl() {
        let c = cache();
        let id = ReservationId::new_v4();
        c.set_active("u1", "sku1", id);
        assert_eq!(c.get_active("u1", "sku1"), Some(id));
    }

    #[test]
    fn reject_is_consumed_exactly_once() {
        let c = cache();
        c.set_reject(
            "u1",
            "sku1",
            Rejection {
                code: ErrorCode::OutOfStock,
                message: "no stock".into(),
            },
        );
        assert!(c.take_reject("u1", "sku1").is_some());
        assert!(c.take_reject("u1", "sku1").is_none());
    }

    #[test]
    fn reject_expires_after_ttl() {
        let c = cache();
        c.set_reject(
            "u1",
            "sku1",
            Rejection {
                code: ErrorCode::OutOfStock,
                message: "no stock".into(),
            },
        );
        std::thread::sleep(Duration::from_millis(30));
        assert!(c.take_reject("u1", "sku1").is_none());
    }

    #[test]
    fn stock_miss_is_not_a_negative_signal() {
        let c = cache();
        assert_eq!(c.get_stock("sku-never-seen"), None);
    }
}
