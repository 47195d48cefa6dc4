use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use trendcache::{TrendCacheError, TrendsResponse};

use super::AppState;
use crate::dto::TrendsParams;

/// Current trends for a geography
///
/// Served from memory. With `force_refresh=true` the request waits for a
/// collection run, joining one already in progress.
#[utoipa::path(
    get,
    path = "/api/trends",
    tag = "trends",
    params(TrendsParams),
    responses(
        (status = 200, description = "Trends from the current snapshot", body = serde_json::Value),
        (status = 404, description = "Unknown geography or category", body = serde_json::Value)
    )
)]
pub async fn get_trends(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendsParams>,
) -> Result<Json<TrendsResponse>, TrendCacheError> {
    let cache = state.registry.get(params.geo.as_deref())?;

    let query = params.to_query();
    if !params.force_refresh {
        return Ok(Json(cache.query.query(&query)?));
    }

    let outcome = cache.coordinator.force_refresh().await;
    tracing::info!(
        geography = cache.store.geography(),
        replaced = outcome.replaced,
        "Force refresh finished"
    );
    let response = cache.query.query_snapshot(outcome.snapshot, &query)?;
    Ok(Json(response))
}
