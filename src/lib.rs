//! Flash-sale inventory reservation engine.
//!
//! A single-writer-per-sku pipeline for short, high-contention bursts: many
//! clients race to place a time-bounded hold on scarce inventory, then
//! convert it into an order via payment. See `SPEC_FULL.md` for the full
//! design; the module list below mirrors the pipeline stages it describes.
//!
//! # Modules
//!
//! - [`core_types`] - opaque IDs and type aliases shared across the crate
//! - [`config`] - process-wide tuning knobs, loaded from the environment
//! - [`error`] - the `ReservationError` taxonomy crossing every boundary
//! - [`models`] - domain entities: Product, Inventory, Reservation, Order
//! - [`messages`] - payloads that travel on the partitioned log
//! - [`log`] - the partitioned, sku-keyed ordered message log
//! - [`cache`] - the TTL response cache the Poller reads
//! - [`repository`] - the durable-store access trait plus Postgres/mock impls
//! - [`submitter`] - request ingress: pre-validation, then enqueue
//! - [`consumer`] - the single-writer batch consumer owning each partition
//! - [`outcome`] - publishes consumer results to the response cache
//! - [`poller`] - the per-request cooperative wait loop
//! - [`sweeper`] - periodic expiry of stale holds
//! - [`db`] - PostgreSQL connection pool management
//! - [`logging`] - tracing subscriber setup
//! - [`gateway`] - the thin axum HTTP surface wiring the core together

pub mod cache;
pub mod config;
pub mod consumer;
pub mod core_types;
pub mod db;
pub mod error;
pub mod log;
pub mod logging;
pub mod messages;
pub mod models;
pub mod outcome;
pub mod poller;
pub mod repository;
pub mod submitter;
pub mod sweeper;

pub mod gateway;

pub use cache::ResponseCache;
pub use config::AppConfig;
pub use consumer::PartitionWorker;
pub use core_types::{CorrelationId, Money, OrderId, ReservationId, RequestId, SkuId, UserId};
pub use error::{ErrorCode, ReservationError};
pub use log::PartitionedLog;
pub use messages::{LifecycleEvent, Outcome, ReservationMessage, ReservationRequest};
pub use models::{Inventory, Order, Product, Reservation, ReservationStatus, UserPurchase};
pub use outcome::OutcomeWriter;
pub use poller::Poller;
pub use repository::{PgRepository, Repository};
pub use submitter::Submitter;
pub use sweeper::ExpirySweeper;
