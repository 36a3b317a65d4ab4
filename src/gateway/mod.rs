//! Thin axum HTTP surface wiring the reservation core together.
//!
//! Exposes exactly the inbound API surface spec §6 calls out: submit,
//! cancel, checkout (confirm), and an availability read. Authentication,
//! rate limiting, and payment-gateway integration are external
//! collaborators (§1) — this module has no middleware stack, unlike the
//! teacher's original `gateway/mod.rs`, which layered Ed25519-signature auth
//! and JWT guards in front of the trading routes.

pub mod handlers;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::log::PartitionedLog;
use crate::poller::Poller;
use crate::repository::Repository;
use crate::submitter::Submitter;
use state::AppState;

/// Build the router. Split out from `serve` so a test harness can mount it
/// against a `tower::ServiceExt::oneshot` call without binding a socket.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health::health_check))
        .route("/reservations", post(handlers::reservation::create_reservation))
        .route(
            "/reservations/{id}",
            delete(handlers::reservation::cancel_reservation),
        )
        .route("/orders/checkout", post(handlers::order::checkout))
        .route(
            "/products/{sku_id}/availability",
            get(handlers::product::availability),
        )
        .with_state(state)
}

/// Assemble `AppState` and serve the router until the process is killed.
/// Does not spawn the partition workers or the sweeper — those run as
/// separate tokio tasks started alongside this one in `main`.
pub async fn serve(
    config: &AppConfig,
    repository: Arc<dyn Repository>,
    cache: Arc<ResponseCache>,
    log: Arc<PartitionedLog>,
) -> std::io::Result<()> {
    let poller = Poller::from_config(cache.clone(), repository.clone(), config);
    let submitter = Arc::new(Submitter::new(
        repository.clone(),
        cache.clone(),
        log.clone(),
        poller,
    ));
    let state = Arc::new(AppState::new(repository, cache, submitter, log));

    let app = router(state);
    let listener = TcpListener::bind(&config.gateway_bind_addr).await?;
    tracing::info!(addr = %config.gateway_bind_addr, "gateway listening");
    axum::serve(listener, app).await
}
