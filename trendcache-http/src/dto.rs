use serde::{Deserialize, Serialize};
use trendcache::{CacheInfo, LaunchOutcome, RefreshState, TriggerAck, TrendsQuery};
use utoipa::IntoParams;

fn default_flat() -> bool {
    true
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrendsParams {
    /// Geography code; the configured default when omitted.
    #[serde(default)]
    pub geo: Option<String>,
    /// Restrict the result to one category, by name.
    #[serde(default)]
    pub category: Option<String>,
    /// One flat list (default) or records grouped by category.
    #[serde(default = "default_flat")]
    pub flat: bool,
    /// Run (or join) a refresh and answer with its result.
    #[serde(default)]
    pub force_refresh: bool,
}

impl TrendsParams {
    pub fn to_query(&self) -> TrendsQuery {
        TrendsQuery {
            flat: self.flat,
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GeoParams {
    #[serde(default)]
    pub geo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub geography: String,
    pub previous_state: RefreshState,
    pub cache_info: CacheInfo,
}

impl UpdateResponse {
    pub fn from_ack(geography: &str, ack: TriggerAck) -> Self {
        let (status, message) = match ack.status {
            LaunchOutcome::Started => ("update_triggered", "Cache update started in background"),
            LaunchOutcome::AlreadyRunning => (
                "update_already_running",
                "An update is already in progress",
            ),
        };
        Self {
            status,
            message,
            geography: geography.to_string(),
            previous_state: ack.previous_state,
            cache_info: ack.cache_info,
        }
    }
}
