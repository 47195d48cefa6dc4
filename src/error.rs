use http::StatusCode;
use thiserror::Error;

use crate::collector::CollectErrorKind;

#[derive(Error, Debug, Clone)]
pub enum TrendCacheError {
    #[error("Geography not configured: {0}")]
    GeographyNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Collector failed for category {category} ({category_id}): {kind}: {message}")]
    CollectorFailure {
        category_id: u32,
        category: String,
        kind: CollectErrorKind,
        message: String,
    },

    #[error("Refresh for {geography} collected no categories ({failures} failures)")]
    RunFailedEntirely { geography: String, failures: usize },

    #[error("Failed to persist snapshot: {0}")]
    PersistenceFailure(String),

    #[error("Failed to load snapshot: {0}")]
    LoadFailure(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TrendCacheError>;

impl From<std::io::Error> for TrendCacheError {
    fn from(e: std::io::Error) -> Self {
        TrendCacheError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TrendCacheError {
    fn from(e: serde_json::Error) -> Self {
        TrendCacheError::Json(e.to_string())
    }
}

impl TrendCacheError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TrendCacheError::GeographyNotFound(_) => StatusCode::NOT_FOUND,
            TrendCacheError::CategoryNotFound(_) => StatusCode::NOT_FOUND,
            TrendCacheError::CollectorFailure { .. } => StatusCode::BAD_GATEWAY,
            TrendCacheError::RunFailedEntirely { .. } => StatusCode::BAD_GATEWAY,
            TrendCacheError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TrendCacheError::LoadFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TrendCacheError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TrendCacheError::Json(_) => StatusCode::BAD_REQUEST,
            TrendCacheError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            TrendCacheError::GeographyNotFound(_) => "geography_not_found",
            TrendCacheError::CategoryNotFound(_) => "category_not_found",
            TrendCacheError::CollectorFailure { .. } => "collector_failure",
            TrendCacheError::RunFailedEntirely { .. } => "run_failed_entirely",
            TrendCacheError::PersistenceFailure(_) => "persistence_failure",
            TrendCacheError::LoadFailure(_) => "load_failure",
            TrendCacheError::Io(_) => "io_error",
            TrendCacheError::Json(_) => "json_error",
            TrendCacheError::Config(_) => "config_error",
        }
    }
}

// Axum IntoResponse implementation (feature-gated)
#[cfg(feature = "axum-support")]
use axum::response::{IntoResponse, Json, Response};
#[cfg(feature = "axum-support")]
use serde::Serialize;

#[cfg(feature = "axum-support")]
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[cfg(feature = "axum-support")]
impl IntoResponse for TrendCacheError {
    fn into_response(self) -> Response {
        let suggestion = match &self {
            TrendCacheError::GeographyNotFound(_) => {
                Some("Add the code to TRENDCACHE_GEOS and restart".to_string())
            }
            TrendCacheError::CategoryNotFound(_) => {
                Some("Use a category name exactly as listed in the grouped response".to_string())
            }
            _ => None,
        };

        let error_response = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            request_id: format!("req_tc_{}", uuid::Uuid::new_v4()),
            suggestion,
        };

        (self.status_code(), Json(error_response)).into_response()
    }
}
