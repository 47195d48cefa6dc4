use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use trendcache::TrendCacheError;

use super::AppState;
use crate::dto::{GeoParams, UpdateResponse};

/// Trigger a background refresh
///
/// Returns immediately. A second trigger while a run is in progress is
/// acknowledged but starts nothing.
#[utoipa::path(
    post,
    path = "/api/update",
    tag = "trends",
    params(GeoParams),
    responses(
        (status = 200, description = "Refresh triggered or already running", body = serde_json::Value),
        (status = 404, description = "Unknown geography", body = serde_json::Value)
    )
)]
pub async fn trigger_update(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeoParams>,
) -> Result<Json<UpdateResponse>, TrendCacheError> {
    let cache = state.registry.get(params.geo.as_deref())?;
    let ack = cache.coordinator.trigger_async();
    Ok(Json(UpdateResponse::from_ack(cache.store.geography(), ack)))
}
