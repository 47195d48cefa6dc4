//! # trendcache
//!
//! Cached, periodically refreshed trending-topic snapshots. A pluggable
//! collector fetches each category's trend list; the aggregator merges them
//! into one immutable [`Snapshot`] per geography, which is served from memory,
//! persisted to disk, and refreshed on a fixed interval or on demand.
//!
//! Reads never wait for a refresh. Overlapping refresh requests for the same
//! geography share a single collection run.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trendcache::{CommandCollector, TrendsConfig, TrendsQuery, TrendsRegistry};
//!
//! # async fn run() -> trendcache::Result<()> {
//! let config = TrendsConfig::from_env()?;
//! let collector = Arc::new(CommandCollector::new("./scrape-trends", vec![]));
//! let registry = TrendsRegistry::from_config(&config, collector)?;
//! let _loops = registry.start();
//!
//! let india = registry.get(Some("IN"))?;
//! india.coordinator.force_refresh().await;
//! let response = india.query.query(&TrendsQuery::default())?;
//! println!("{} trends", response.total_count.unwrap_or(0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Dependencies | Use case |
//! |---------|-------------|----------|
//! | `axum-support` | axum | [`TrendCacheError`] implements `IntoResponse` |
//!
//! The HTTP surface lives in the companion `trendcache-http` crate.

pub mod aggregator;
pub mod categories;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod query;
pub mod registry;
pub mod store;
pub mod types;

pub use aggregator::{Aggregator, CategoryFailure, RunReport};
pub use categories::{Category, CategoryTable};
pub use collector::{CollectError, CollectErrorKind, CommandCollector, TrendCollector};
pub use config::TrendsConfig;
pub use coordinator::{
    CacheInfo, CoordinatorStatus, LaunchOutcome, RefreshCoordinator, RefreshOutcome,
    RefreshState, TriggerAck,
};
pub use error::{Result, TrendCacheError};
pub use query::{QueryService, TrendsQuery, TrendsResponse, TrendsView};
pub use registry::{GeoCache, TrendsRegistry};
pub use store::SnapshotStore;
pub use types::*;
