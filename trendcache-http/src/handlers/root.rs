use axum::{extract::State, Json};
use std::sync::Arc;
use trendcache::Category;

use super::AppState;

/// Service description
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service name, version and endpoints", body = serde_json::Value)
    )
)]
pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let categories: Vec<serde_json::Value> = Category::all()
        .into_iter()
        .map(|c| serde_json::json!({ "id": c.id, "name": c.name }))
        .collect();

    Json(serde_json::json!({
        "name": "trendcache",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Cached trending searches, refreshed in the background",
        "default_geography": state.registry.default_geography(),
        "geographies": state.registry.geographies(),
        "categories": categories,
        "endpoints": {
            "GET /api/trends": "Current trends (?geo=&category=&flat=true&force_refresh=false)",
            "POST /api/update": "Trigger a background refresh (?geo=)",
            "GET /health": "Refresh state per geography",
            "GET /api-docs/openapi.json": "OpenAPI document",
        },
    }))
}
