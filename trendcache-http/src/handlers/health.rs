use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = serde_json::Value)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut geographies = serde_json::Map::new();
    for geo in state.registry.geographies() {
        let Ok(cache) = state.registry.get(Some(geo)) else {
            continue;
        };
        let status = cache.coordinator.status();
        geographies.insert(
            geo.clone(),
            serde_json::json!({
                "state": status.state,
                "runs_started": status.runs_started,
                "runs_completed": status.runs_completed,
                "last_completed_at": status.last_completed_at,
                "last_replaced_at": status.last_replaced_at,
                "seconds_since_last_replace": status.seconds_since_last_replace,
                "last_run_failures": status.last_report.as_ref().map(|r| r.failures.len()),
                "cache_info": cache.coordinator.cache_info(),
            }),
        );
    }

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "default_geography": state.registry.default_geography(),
        "geographies": geographies,
    }))
}
