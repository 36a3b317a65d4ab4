//! Data access layer: a `Repository` trait plus a PostgreSQL implementation
//! and an in-memory mock for unit tests.
//!
//! Shaped like `persistence::repository`'s `OrderRepository`/
//! `BalanceRepository` traits (trait for the seam, concrete struct wrapping
//! a connection handle for the real implementation), but queried with
//! `sqlx::query`/`query_as` the way `sentinel::confirmation` does rather than
//! the `query_as!` compile-time macro `account::repository` uses — the
//! macro variant needs a reachable database at build time to check its SQL
//! against, which this crate cannot assume.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::core_types::{OrderId, ReservationId, SkuId, UserId};
use crate::error::ReservationError;
use crate::models::{Inventory, Order, OrderStatus, Product, Reservation, ReservationStatus};

/// One grant produced by `consumer::allocate`: enough units exist for this
/// request and it should become a RESERVED row.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub reservation_id: ReservationId,
    pub user_id: UserId,
    pub sku_id: SkuId,
    pub quantity: i32,
    pub idempotency_key: String,
    pub expires_at: DateTime<Utc>,
}

/// Data access the reservation core needs. Every method that mutates state
/// does so transactionally — partial application of a batch is never
/// observable.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_product(&self, sku_id: &str) -> Result<Option<Product>, ReservationError>;

    async fn get_inventory(&self, sku_id: &str) -> Result<Option<Inventory>, ReservationError>;

    async fn find_reservation_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Reservation>, ReservationError>;

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, ReservationError>;

    async fn has_user_purchased(
        &self,
        user_id: &str,
        sku_id: &str,
    ) -> Result<bool, ReservationError>;

    /// Apply a batch of grants for a single sku in one transaction: insert a
    /// RESERVED row per grant and move that many units from `available` to
    /// `reserved`. Callers (`consumer::allocate`) must have already capped
    /// `grants` to the inventory's `available` count — this just commits it.
    async fn apply_allocation(
        &self,
        sku_id: &str,
        grants: &[Allocation],
    ) -> Result<Vec<Reservation>, ReservationError>;

    /// RESERVED -> CONFIRMED, moving `reserved` to `sold` and writing the
    /// `user_purchases` and `orders` rows, all in one transaction. Idempotent:
    /// calling this again on a reservation that is already CONFIRMED returns
    /// its existing order rather than erroring (spec §4.2/§8).
    async fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        order_id: OrderId,
    ) -> Result<(Reservation, Order), ReservationError>;

    /// Look up the order produced by a reservation's confirmation, if any.
    /// Used by the checkout handler to recover an order whose
    /// `confirmed_order` cache entry was already consumed by an earlier
    /// call — the cache is read-and-clear, so a retried checkout on an
    /// already-CONFIRMED reservation can't rely on it alone.
    async fn get_order(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Order>, ReservationError>;

    /// RESERVED -> CANCELLED, returning `reserved` units to `available`.
    async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError>;

    /// RESERVED -> EXPIRED, returning `reserved` units to `available`.
    /// A no-op (returns the current row unchanged) if the reservation is
    /// already terminal, so a late-arriving EXPIRE after a CONFIRM/CANCEL
    /// race is harmless.
    async fn expire_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError>;

    /// RESERVED rows whose `expires_at` has passed, for the sweeper to
    /// re-route through the single-writer partition.
    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reservation>, ReservationError>;

    /// Cheap liveness check for the health endpoint.
    async fn ping(&self) -> Result<(), ReservationError>;
}

/// PostgreSQL-backed implementation.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_reservation(row: &sqlx::postgres::PgRow) -> Reservation {
        Reservation {
            reservation_id: row.get("reservation_id"),
            user_id: row.get("user_id"),
            sku_id: row.get("sku_id"),
            quantity: row.get("quantity"),
            status: row.get("status"),
            expires_at: row.get("expires_at"),
            idempotency_key: row.get("idempotency_key"),
            created_at: row.get("created_at"),
            confirmed_at: row.get("confirmed_at"),
            expired_at: row.get("expired_at"),
            cancelled_at: row.get("cancelled_at"),
        }
    }

    fn row_to_order(row: &sqlx::postgres::PgRow) -> Order {
        Order {
            order_id: row.get("order_id"),
            reservation_id: row.get("reservation_id"),
            user_id: row.get("user_id"),
            sku_id: row.get("sku_id"),
            quantity: row.get("quantity"),
            total_price: row.get("total_price"),
            status: row.get("status"),
            payment_txn_id: row.get("payment_txn_id"),
            shipping_address: row.get("shipping_address"),
            created_at: row.get("created_at"),
            fulfilled_at: row.get("fulfilled_at"),
            cancelled_at: row.get("cancelled_at"),
        }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn get_product(&self, sku_id: &str) -> Result<Option<Product>, ReservationError> {
        let product = sqlx::query_as::<_, Product>(
            r#"SELECT sku_id, name, category, image_url, base_price, sale_price,
                      event_id, is_active, created_at, updated_at
               FROM products WHERE sku_id = $1"#,
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    async fn get_inventory(&self, sku_id: &str) -> Result<Option<Inventory>, ReservationError> {
        let inventory = sqlx::query_as::<_, Inventory>(
            r#"SELECT total, reserved, sold, available FROM inventory WHERE sku_id = $1"#,
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inventory)
    }

    async fn find_reservation_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Reservation>, ReservationError> {
        // `idempotency_key` is only uniquely constrained while RESERVED (the
        // partial index in migrations/20260101000000_init.sql) - a user who
        // has cycled hold -> cancel -> hold again shares one key across
        // multiple historical rows, so this must filter to the live one;
        // without it, `fetch_optional` could hand back an arbitrary
        // terminal row instead of the at-most-one live RESERVED row the
        // index actually guarantees.
        let row = sqlx::query(
            r#"SELECT reservation_id, user_id, sku_id, quantity, status, expires_at,
                      idempotency_key, created_at, confirmed_at, expired_at, cancelled_at
               FROM reservations WHERE idempotency_key = $1 AND status = 'RESERVED'"#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::row_to_reservation))
    }

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, ReservationError> {
        let row = sqlx::query(
            r#"SELECT reservation_id, user_id, sku_id, quantity, status, expires_at,
                      idempotency_key, created_at, confirmed_at, expired_at, cancelled_at
               FROM reservations WHERE reservation_id = $1"#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::row_to_reservation))
    }

    async fn has_user_purchased(
        &self,
        user_id: &str,
        sku_id: &str,
    ) -> Result<bool, ReservationError> {
        let row = sqlx::query(
            r#"SELECT 1 AS one FROM user_purchases WHERE user_id = $1 AND sku_id = $2"#,
        )
        .bind(user_id)
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn apply_allocation(
        &self,
        sku_id: &str,
        grants: &[Allocation],
    ) -> Result<Vec<Reservation>, ReservationError> {
        if grants.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let total_qty: i64 = grants.iter().map(|g| g.quantity as i64).sum();

        sqlx::query(
            r#"UPDATE inventory
               SET available = available - $1, reserved = reserved + $1
               WHERE sku_id = $2"#,
        )
        .bind(total_qty)
        .bind(sku_id)
        .execute(&mut *tx)
        .await?;

        let mut reservations = Vec::with_capacity(grants.len());
        for grant in grants {
            let row = sqlx::query(
                r#"INSERT INTO reservations
                       (reservation_id, user_id, sku_id, quantity, status, expires_at, idempotency_key)
                   VALUES ($1, $2, $3, $4, 'RESERVED', $5, $6)
                   RETURNING reservation_id, user_id, sku_id, quantity, status, expires_at,
                             idempotency_key, created_at, confirmed_at, expired_at, cancelled_at"#,
            )
            .bind(grant.reservation_id)
            .bind(&grant.user_id)
            .bind(&grant.sku_id)
            .bind(grant.quantity)
            .bind(grant.expires_at)
            .bind(&grant.idempotency_key)
            .fetch_one(&mut *tx)
            .await?;
            reservations.push(Self::row_to_reservation(&row));
        }

        tx.commit().await?;
        Ok(reservations)
    }

    async fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        order_id: OrderId,
    ) -> Result<(Reservation, Order), ReservationError> {
        let mut tx = self.pool.begin().await?;

        // Only a live hold (RESERVED and not yet past its expiry) may be
        // confirmed - a row the Sweeper hasn't gotten to yet but whose
        // `expires_at` has already passed must fail CANNOT_CONFIRM, per
        // spec §4.2.
        let row = sqlx::query(
            r#"UPDATE reservations
               SET status = 'CONFIRMED', confirmed_at = now()
               WHERE reservation_id = $1 AND status = 'RESERVED' AND expires_at > now()
               RETURNING reservation_id, user_id, sku_id, quantity, status, expires_at,
                         idempotency_key, created_at, confirmed_at, expired_at, cancelled_at"#,
        )
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Nothing matched: either the id doesn't exist, it's terminal in
            // a way that isn't CONFIRMED, its hold expired, or it's already
            // CONFIRMED. Distinguish the last case, which is a no-op success
            // per spec §4.2/§8, from the rest, which are real errors.
            let existing = sqlx::query(
                r#"SELECT reservation_id, user_id, sku_id, quantity, status, expires_at,
                          idempotency_key, created_at, confirmed_at, expired_at, cancelled_at
                   FROM reservations WHERE reservation_id = $1"#,
            )
            .bind(reservation_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| Self::row_to_reservation(&r));

            return match existing {
                Some(reservation) if reservation.status == ReservationStatus::Confirmed => {
                    let order_row = sqlx::query(
                        r#"SELECT order_id, reservation_id, user_id, sku_id, quantity,
                                  total_price, status, payment_txn_id, shipping_address,
                                  created_at, fulfilled_at, cancelled_at
                           FROM orders WHERE reservation_id = $1"#,
                    )
                    .bind(reservation_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| {
                        ReservationError::CannotConfirm(format!(
                            "{reservation_id} is CONFIRMED but has no order row"
                        ))
                    })?;
                    tx.commit().await?;
                    Ok((reservation, Self::row_to_order(&order_row)))
                }
                _ => Err(ReservationError::CannotConfirm(format!(
                    "{reservation_id} is not a live RESERVED hold"
                ))),
            };
        };

        let reservation = Self::row_to_reservation(&row);

        sqlx::query(
            r#"UPDATE inventory
               SET reserved = reserved - $1, sold = sold + $1
               WHERE sku_id = $2"#,
        )
        .bind(reservation.quantity as i64)
        .bind(&reservation.sku_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO user_purchases (user_id, sku_id, order_id, reservation_id, quantity)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&reservation.user_id)
        .bind(&reservation.sku_id)
        .bind(order_id)
        .bind(reservation_id)
        .bind(reservation.quantity)
        .execute(&mut *tx)
        .await?;

        let product = sqlx::query(r#"SELECT sale_price FROM products WHERE sku_id = $1"#)
            .bind(&reservation.sku_id)
            .fetch_one(&mut *tx)
            .await?;
        let sale_price: rust_decimal::Decimal = product.get("sale_price");
        let total_price = sale_price * rust_decimal::Decimal::from(reservation.quantity);

        let order_row = sqlx::query(
            r#"INSERT INTO orders
                   (order_id, reservation_id, user_id, sku_id, quantity, total_price, status)
               VALUES ($1, $2, $3, $4, $5, $6, 'PAYMENT_PENDING')
               RETURNING order_id, reservation_id, user_id, sku_id, quantity, total_price,
                         status, payment_txn_id, shipping_address, created_at, fulfilled_at,
                         cancelled_at"#,
        )
        .bind(order_id)
        .bind(reservation_id)
        .bind(&reservation.user_id)
        .bind(&reservation.sku_id)
        .bind(reservation.quantity)
        .bind(total_price)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((reservation, Self::row_to_order(&order_row)))
    }

    async fn get_order(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Order>, ReservationError> {
        let row = sqlx::query(
            r#"SELECT order_id, reservation_id, user_id, sku_id, quantity, total_price,
                      status, payment_txn_id, shipping_address, created_at, fulfilled_at,
                      cancelled_at
               FROM orders WHERE reservation_id = $1"#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::row_to_order))
    }

    async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        release_reserved_hold(&self.pool, reservation_id, "CANCELLED").await
    }

    async fn expire_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        match release_reserved_hold(&self.pool, reservation_id, "EXPIRED").await {
            Ok(reservation) => Ok(reservation),
            Err(ReservationError::CannotConfirm(_)) => self
                .get_reservation(reservation_id)
                .await?
                .ok_or_else(|| ReservationError::CannotConfirm(format!("{reservation_id} not found"))),
            Err(other) => Err(other),
        }
    }

    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let rows = sqlx::query(
            r#"SELECT reservation_id, user_id, sku_id, quantity, status, expires_at,
                      idempotency_key, created_at, confirmed_at, expired_at, cancelled_at
               FROM reservations
               WHERE status = 'RESERVED' AND expires_at <= $1
               ORDER BY expires_at ASC
               LIMIT $2"#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_reservation).collect())
    }

    async fn ping(&self) -> Result<(), ReservationError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn release_reserved_hold(
    pool: &PgPool,
    reservation_id: ReservationId,
    terminal_status: &str,
) -> Result<Reservation, ReservationError> {
    let mut tx = pool.begin().await?;

    let timestamp_column = match terminal_status {
        "CANCELLED" => "cancelled_at",
        "EXPIRED" => "expired_at",
        other => unreachable!("unexpected terminal status {other}"),
    };

    let row = sqlx::query(&format!(
        r#"UPDATE reservations
           SET status = $1, {timestamp_column} = now()
           WHERE reservation_id = $2 AND status = 'RESERVED'
           RETURNING reservation_id, user_id, sku_id, quantity, status, expires_at,
                     idempotency_key, created_at, confirmed_at, expired_at, cancelled_at"#
    ))
    .bind(terminal_status)
    .bind(reservation_id)
    .fetch_optional(&mut *tx)
    .await?;

    let reservation = row.as_ref().map(PgRepository::row_to_reservation).ok_or_else(|| {
        ReservationError::CannotConfirm(format!("{reservation_id} is not RESERVED"))
    })?;

    sqlx::query(
        r#"UPDATE inventory
           SET reserved = reserved - $1, available = available + $1
           WHERE sku_id = $2"#,
    )
    .bind(reservation.quantity as i64)
    .bind(&reservation.sku_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(reservation)
}

/// In-memory `Repository` for unit tests, mirroring the role
/// `transfer::adapters`' mock chain adapter plays for the transfer FSM:
/// deterministic, no I/O, enough behavior to exercise allocation and
/// lifecycle logic without a database.
///
/// Also compiled under `test-support` so the `tests/` integration suite
/// (a separate crate that links this one as an ordinary dependency, not
/// with `--cfg test`) can reach it.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        products: HashMap<SkuId, Product>,
        inventory: HashMap<SkuId, Inventory>,
        reservations: HashMap<ReservationId, Reservation>,
        // Every reservation_id ever issued under a given key, oldest first —
        // mirrors the real schema, where the partial unique index only
        // constrains the RESERVED row and terminal rows from earlier
        // hold/cancel cycles stick around sharing the same key.
        by_idempotency_key: HashMap<String, Vec<ReservationId>>,
        purchases: std::collections::HashSet<(UserId, SkuId)>,
        orders: HashMap<OrderId, Order>,
    }

    pub struct MockStore {
        state: Mutex<State>,
    }

    impl Default for MockStore {
        fn default() -> Self {
            Self {
                state: Mutex::new(State::default()),
            }
        }
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed_product(&self, product: Product, inventory: Inventory) {
            let mut state = self.state.lock().unwrap();
            state.inventory.insert(product.sku_id.clone(), inventory);
            state.products.insert(product.sku_id.clone(), product);
        }
    }

    #[async_trait]
    impl Repository for MockStore {
        async fn get_product(&self, sku_id: &str) -> Result<Option<Product>, ReservationError> {
            Ok(self.state.lock().unwrap().products.get(sku_id).cloned())
        }

        async fn get_inventory(&self, sku_id: &str) -> Result<Option<Inventory>, ReservationError> {
            Ok(self.state.lock().unwrap().inventory.get(sku_id).copied())
        }

        async fn find_reservation_by_idempotency_key(
            &self,
            idempotency_key: &str,
        ) -> Result<Option<Reservation>, ReservationError> {
            let state = self.state.lock().unwrap();
            // At most one row per key can be RESERVED at a time; scan the
            // history for it rather than assuming the most recent id is live.
            Ok(state
                .by_idempotency_key
                .get(idempotency_key)
                .into_iter()
                .flatten()
                .filter_map(|id| state.reservations.get(id))
                .find(|r| r.status == ReservationStatus::Reserved)
                .cloned())
        }

        async fn get_reservation(
            &self,
            reservation_id: ReservationId,
        ) -> Result<Option<Reservation>, ReservationError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .reservations
                .get(&reservation_id)
                .cloned())
        }

        async fn has_user_purchased(
            &self,
            user_id: &str,
            sku_id: &str,
        ) -> Result<bool, ReservationError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .purchases
                .contains(&(user_id.to_string(), sku_id.to_string())))
        }

        async fn apply_allocation(
            &self,
            sku_id: &str,
            grants: &[Allocation],
        ) -> Result<Vec<Reservation>, ReservationError> {
            let mut state = self.state.lock().unwrap();
            let total_qty: i64 = grants.iter().map(|g| g.quantity as i64).sum();

            if let Some(inv) = state.inventory.get_mut(sku_id) {
                inv.available -= total_qty;
                inv.reserved += total_qty;
            }

            let mut created = Vec::with_capacity(grants.len());
            for grant in grants {
                let reservation = Reservation {
                    reservation_id: grant.reservation_id,
                    user_id: grant.user_id.clone(),
                    sku_id: grant.sku_id.clone(),
                    quantity: grant.quantity,
                    status: ReservationStatus::Reserved,
                    expires_at: grant.expires_at,
                    idempotency_key: grant.idempotency_key.clone(),
                    created_at: Utc::now(),
                    confirmed_at: None,
                    expired_at: None,
                    cancelled_at: None,
                };
                state
                    .by_idempotency_key
                    .entry(grant.idempotency_key.clone())
                    .or_default()
                    .push(grant.reservation_id);
                state
                    .reservations
                    .insert(grant.reservation_id, reservation.clone());
                created.push(reservation);
            }
            Ok(created)
        }

        async fn confirm_reservation(
            &self,
            reservation_id: ReservationId,
            order_id: OrderId,
        ) -> Result<(Reservation, Order), ReservationError> {
            let mut state = self.state.lock().unwrap();
            let Some(existing) = state.reservations.get(&reservation_id).cloned() else {
                return Err(ReservationError::CannotConfirm(format!(
                    "{reservation_id} not found"
                )));
            };

            // Already confirmed: idempotent no-op, hand back the order this
            // reservation already produced rather than erroring or minting a
            // second one.
            if existing.status == ReservationStatus::Confirmed {
                let order = state
                    .orders
                    .values()
                    .find(|o| o.reservation_id == reservation_id)
                    .cloned()
                    .ok_or_else(|| {
                        ReservationError::CannotConfirm(format!(
                            "{reservation_id} is CONFIRMED but has no order"
                        ))
                    })?;
                return Ok((existing, order));
            }

            if existing.status != ReservationStatus::Reserved || existing.expires_at <= Utc::now() {
                return Err(ReservationError::CannotConfirm(format!(
                    "{reservation_id} is not a live RESERVED hold"
                )));
            }

            let reservation = state.reservations.get_mut(&reservation_id).unwrap();
            reservation.status = ReservationStatus::Confirmed;
            reservation.confirmed_at = Some(Utc::now());
            let reservation = reservation.clone();

            if let Some(inv) = state.inventory.get_mut(&reservation.sku_id) {
                inv.reserved -= reservation.quantity as i64;
                inv.sold += reservation.quantity as i64;
            }
            state
                .purchases
                .insert((reservation.user_id.clone(), reservation.sku_id.clone()));

            let sale_price = state
                .products
                .get(&reservation.sku_id)
                .map(|p| p.sale_price)
                .unwrap_or_default();
            let order = Order {
                order_id,
                reservation_id,
                user_id: reservation.user_id.clone(),
                sku_id: reservation.sku_id.clone(),
                quantity: reservation.quantity,
                total_price: sale_price * rust_decimal::Decimal::from(reservation.quantity),
                status: OrderStatus::PaymentPending,
                payment_txn_id: None,
                shipping_address: None,
                created_at: Utc::now(),
                fulfilled_at: None,
                cancelled_at: None,
            };
            state.orders.insert(order_id, order.clone());

            Ok((reservation, order))
        }

        async fn get_order(
            &self,
            reservation_id: ReservationId,
        ) -> Result<Option<Order>, ReservationError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .orders
                .values()
                .find(|o| o.reservation_id == reservation_id)
                .cloned())
        }

        async fn cancel_reservation(
            &self,
            reservation_id: ReservationId,
        ) -> Result<Reservation, ReservationError> {
            self.release(reservation_id, ReservationStatus::Cancelled, true)
        }

        async fn expire_reservation(
            &self,
            reservation_id: ReservationId,
        ) -> Result<Reservation, ReservationError> {
            self.release(reservation_id, ReservationStatus::Expired, false)
        }

        async fn find_expired_reservations(
            &self,
            now: DateTime<Utc>,
            limit: i64,
        ) -> Result<Vec<Reservation>, ReservationError> {
            let state = self.state.lock().unwrap();
            let mut expired: Vec<Reservation> = state
                .reservations
                .values()
                .filter(|r| r.status == ReservationStatus::Reserved && r.expires_at <= now)
                .cloned()
                .collect();
            expired.sort_by_key(|r| r.expires_at);
            expired.truncate(limit as usize);
            Ok(expired)
        }

        async fn ping(&self) -> Result<(), ReservationError> {
            Ok(())
        }
    }

    impl MockStore {
        fn release(
            &self,
            reservation_id: ReservationId,
            status: ReservationStatus,
            error_if_not_reserved: bool,
        ) -> Result<Reservation, ReservationError> {
            let mut state = self.state.lock().unwrap();
            let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
                return Err(ReservationError::CannotConfirm(format!(
                    "{reservation_id} not found"
                )));
            };

            if reservation.status != ReservationStatus::Reserved {
                if error_if_not_reserved {
                    return Err(ReservationError::CannotConfirm(format!(
                        "{reservation_id} is not RESERVED"
                    )));
                }
                return Ok(reservation.clone());
            }

            reservation.status = status;
            let now = Utc::now();
            match status {
                ReservationStatus::Cancelled => reservation.cancelled_at = Some(now),
                ReservationStatus::Expired => reservation.expired_at = Some(now),
                _ => unreachable!(),
            }
            let quantity = reservation.quantity;
            let sku_id = reservation.sku_id.clone();
            let reservation = reservation.clone();

            if let Some(inv) = state.inventory.get_mut(&sku_id) {
                inv.reserved -= quantity as i64;
                inv.available += quantity as i64;
            }

            Ok(reservation)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::core_types::ReservationId;

        fn grant(sku_id: &str, user_id: &str, qty: i32) -> Allocation {
            Allocation {
                reservation_id: ReservationId::new_v4(),
                user_id: user_id.to_string(),
                sku_id: sku_id.to_string(),
                quantity: qty,
                idempotency_key: crate::core_types::idempotency_key(user_id, sku_id),
                expires_at: Utc::now() + chrono::Duration::seconds(120),
            }
        }

        #[tokio::test]
        async fn allocation_moves_available_to_reserved() {
            let store = MockStore::new();
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
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                Inventory {
                    total: 10,
                    reserved: 0,
                    sold: 0,
                    available: 10,
                },
            );

            store
                .apply_allocation("sku1", &[grant("sku1", "u1", 2)])
                .await
                .unwrap();

            let inv = store.get_inventory("sku1").await.unwrap().unwrap();
            assert_eq!(inv.available, 8);
            assert_eq!(inv.reserved, 2);
            assert!(inv.is_consistent());
        }

        #[tokio::test]
        async fn expire_is_a_no_op_once_already_confirmed() {
            let store = MockStore::new();
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
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                Inventory {
                    total: 10,
                    reserved: 0,
                    sold: 0,
                    available: 10,
                },
            );
            let reservations = store
                .apply_allocation("sku1", &[grant("sku1", "u1", 1)])
                .await
                .unwrap();
            let reservation_id = reservations[0].reservation_id;

            store
                .confirm_reservation(reservation_id, OrderId::new_v4())
                .await
                .unwrap();

            let after_expire = store.expire_reservation(reservation_id).await.unwrap();
            assert_eq!(after_expire.status, ReservationStatus::Confirmed);
        }

        fn seeded_store() -> MockStore {
            let store = MockStore::new();
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
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                Inventory {
                    total: 10,
                    reserved: 0,
                    sold: 0,
                    available: 10,
                },
            );
            store
        }

        #[tokio::test]
        async fn repeated_confirm_on_a_confirmed_reservation_is_a_no_op() {
            let store = seeded_store();
            let reservations = store
                .apply_allocation("sku1", &[grant("sku1", "u1", 1)])
                .await
                .unwrap();
            let reservation_id = reservations[0].reservation_id;

            let (_, first_order) = store
                .confirm_reservation(reservation_id, OrderId::new_v4())
                .await
                .unwrap();

            // A retried checkout mints its own candidate order_id, but the
            // repository must still hand back the original order.
            let (reservation, second_order) = store
                .confirm_reservation(reservation_id, OrderId::new_v4())
                .await
                .unwrap();

            assert_eq!(reservation.status, ReservationStatus::Confirmed);
            assert_eq!(second_order.order_id, first_order.order_id);
            assert_eq!(second_order.total_price, first_order.total_price);

            let inv = store.get_inventory("sku1").await.unwrap().unwrap();
            assert_eq!(inv.sold, 1, "inventory must not be double-debited");
        }

        #[tokio::test]
        async fn confirm_fails_once_the_hold_has_expired() {
            let store = seeded_store();
            let mut g = grant("sku1", "u1", 1);
            g.expires_at = Utc::now() - chrono::Duration::seconds(1);
            let reservations = store.apply_allocation("sku1", &[g]).await.unwrap();
            let reservation_id = reservations[0].reservation_id;

            let err = store
                .confirm_reservation(reservation_id, OrderId::new_v4())
                .await
                .unwrap_err();
            assert_eq!(err.code(), crate::error::ErrorCode::CannotConfirm);
        }

        #[tokio::test]
        async fn idempotency_key_lookup_ignores_a_cancelled_predecessor() {
            let store = seeded_store();
            let key = crate::core_types::idempotency_key("u1", "sku1");

            let first = store
                .apply_allocation("sku1", &[grant("sku1", "u1", 1)])
                .await
                .unwrap();
            store
                .cancel_reservation(first[0].reservation_id)
                .await
                .unwrap();

            // Same user/sku reuse the same key for a fresh hold once the
            // first one is terminal - exactly the case the partial unique
            // index on `reservations(idempotency_key) WHERE status =
            // 'RESERVED'` is built to allow.
            let second = store
                .apply_allocation("sku1", &[grant("sku1", "u1", 1)])
                .await
                .unwrap();

            let found = store
                .find_reservation_by_idempotency_key(&key)
                .await
                .unwrap()
                .expect("the live RESERVED row should be found");
            assert_eq!(found.reservation_id, second[0].reservation_id);
            assert_eq!(found.status, ReservationStatus::Reserved);
        }
    }
}
