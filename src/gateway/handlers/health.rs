//! Health check handler.
//!
//! Same rate-limited-ping shape as the teacher's `handlers::health_check`: a
//! cheap DB round trip, throttled so a burst of health checks doesn't become
//! its own load on the database.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::super::state::AppState;

const CHECK_INTERVAL_MS: u64 = 5000;
static LAST_CHECK_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Serialize)]
pub struct HealthResponse {
    pub timestamp_ms: u64,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let last_check = LAST_CHECK_MS.load(Ordering::Relaxed);
    let healthy = if now_ms.saturating_sub(last_check) > CHECK_INTERVAL_MS {
        LAST_CHECK_MS.store(now_ms, Ordering::Relaxed);
        match state.repository.ping().await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "health check ping failed");
                false
            }
        }
    } else {
        true
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse { timestamp_ms: now_ms }))
}
