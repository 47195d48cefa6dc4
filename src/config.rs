use std::path::PathBuf;
use std::time::Duration;

use crate::categories::CategoryTable;
use crate::error::{Result, TrendCacheError};

pub const DEFAULT_GEO: &str = "IN";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 120;

/// Configuration for the trends cache, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TrendsConfig {
    /// Geography served when a request names none.
    pub default_geography: String,
    /// Additional geographies, each with its own store and refresh loop.
    pub extra_geographies: Vec<String>,
    /// Fixed interval between scheduled refreshes.
    pub refresh_interval: Duration,
    /// Categories collected by every run, in order.
    pub categories: CategoryTable,
    /// Directory holding one `trends_<GEO>.json` per geography.
    pub data_dir: PathBuf,
    /// Upper bound on concurrent collector calls within one run.
    pub max_concurrency: usize,
    /// Kick off a refresh at startup when nothing was loaded from disk.
    pub refresh_on_start: bool,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            default_geography: DEFAULT_GEO.to_string(),
            extra_geographies: Vec::new(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            categories: CategoryTable::default(),
            data_dir: PathBuf::from("./data"),
            max_concurrency: 1,
            refresh_on_start: true,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

fn split_geos(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|g| g.trim().to_uppercase())
        .filter(|g| !g.is_empty())
        .collect()
}

impl TrendsConfig {
    /// Load config from `TRENDCACHE_*` environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let categories = match std::env::var("TRENDCACHE_CATEGORIES") {
            Ok(ids) => CategoryTable::parse(&ids)?,
            Err(_) => defaults.categories,
        };

        let config = Self {
            default_geography: std::env::var("TRENDCACHE_GEO")
                .map(|g| g.trim().to_uppercase())
                .unwrap_or(defaults.default_geography),
            extra_geographies: std::env::var("TRENDCACHE_GEOS")
                .map(|v| split_geos(&v))
                .unwrap_or_default(),
            refresh_interval: std::env::var("TRENDCACHE_REFRESH_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_interval),
            categories,
            data_dir: std::env::var("TRENDCACHE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_concurrency: std::env::var("TRENDCACHE_MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrency),
            refresh_on_start: env_flag("TRENDCACHE_REFRESH_ON_START", defaults.refresh_on_start),
        };
        config.validate()?;
        Ok(config)
    }

    /// Config rooted at `data_dir` that never refreshes on its own (for tests).
    pub fn for_tests(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            refresh_interval: Duration::from_secs(3600),
            refresh_on_start: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_geography.trim().is_empty() {
            return Err(TrendCacheError::Config(
                "default geography must not be empty".to_string(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(TrendCacheError::Config(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        if self.categories.is_empty() {
            return Err(TrendCacheError::Config(
                "at least one category is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Default geography first, then the extras, without duplicates.
    pub fn geographies(&self) -> Vec<String> {
        let mut geos = vec![self.default_geography.clone()];
        for g in &self.extra_geographies {
            if !geos.contains(g) {
                geos.push(g.clone());
            }
        }
        geos
    }

    /// Collector concurrency, never below one.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    /// Path of the persisted snapshot for a geography.
    pub fn cache_path(&self, geography: &str) -> PathBuf {
        self.data_dir.join(format!("trends_{}.json", geography))
    }
}
