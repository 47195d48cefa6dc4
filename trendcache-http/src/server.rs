use axum::{routing::get, routing::post, Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use crate::handlers::{get_trends, health, root, trigger_update, AppState};
use crate::openapi::ApiDoc;
use trendcache::{TrendCollector, TrendsConfig, TrendsRegistry};

/// All routes over shared state, without the process-level layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/trends", get(get_trends))
        .route("/api/update", post(trigger_update))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .with_state(state)
}

pub async fn serve(collector: Arc<dyn TrendCollector>) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TrendsConfig::from_env()?;
    let bind_addr =
        std::env::var("TRENDCACHE_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8888".to_string());

    tracing::info!(
        default_geography = %config.default_geography,
        refresh_interval_secs = config.refresh_interval.as_secs(),
        categories = config.categories.len(),
        max_concurrency = config.concurrency(),
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    let registry = TrendsRegistry::from_config(&config, collector)?;
    let loops = registry.start();

    let state = Arc::new(AppState {
        registry: Arc::clone(&registry),
    });

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive().max_age(std::time::Duration::from_secs(86400)));

    tracing::info!("Starting trendcache server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown();
    for handle in loops {
        if let Err(e) = handle.await {
            tracing::warn!("Refresh loop ended abnormally: {}", e);
        }
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
