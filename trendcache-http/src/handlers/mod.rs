use std::sync::Arc;
use trendcache::TrendsRegistry;

pub mod health;
pub mod root;
pub mod trends;
pub mod update;

pub struct AppState {
    pub registry: Arc<TrendsRegistry>,
}

pub use health::health;
pub use root::root;
pub use trends::get_trends;
pub use update::trigger_update;
