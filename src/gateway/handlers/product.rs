//! Product/availability read endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::ReservationError;

use super::super::state::AppState;
use super::super::types::AvailabilityResponse;

/// `GET /products/{sku_id}/availability`
///
/// Reads `stock:{sku}` from the response cache first (spec §6: self-heals on
/// a miss) and only falls back to the database when the cache hasn't been
/// warmed yet.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Path(sku_id): Path<String>,
) -> Result<Json<AvailabilityResponse>, ReservationError> {
    if let Some(available) = state.cache.get_stock(&sku_id) {
        return Ok(Json(AvailabilityResponse { sku_id, available }));
    }

    let inventory = state
        .repository
        .get_inventory(&sku_id)
        .await?
        .ok_or_else(|| ReservationError::ProductNotFound(sku_id.clone()))?;

    state.cache.set_stock(&sku_id, inventory.available);
    Ok(Json(AvailabilityResponse {
        sku_id,
        available: inventory.available,
    }))
}
