use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::aggregator::Aggregator;
use crate::collector::TrendCollector;
use crate::config::TrendsConfig;
use crate::coordinator::RefreshCoordinator;
use crate::error::{Result, TrendCacheError};
use crate::query::QueryService;
use crate::store::SnapshotStore;

/// Everything serving one geography. Geographies share nothing but the
/// collector.
pub struct GeoCache {
    pub store: Arc<SnapshotStore>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub query: QueryService,
}

/// One [`GeoCache`] per configured geography, built once at startup.
pub struct TrendsRegistry {
    default_geography: String,
    order: Vec<String>,
    caches: DashMap<String, Arc<GeoCache>>,
    refresh_on_start: bool,
}

impl TrendsRegistry {
    /// Build every geography's cache and load whatever was persisted.
    pub fn from_config(
        config: &TrendsConfig,
        collector: Arc<dyn TrendCollector>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let order = config.geographies();
        let caches = DashMap::new();

        for geo in &order {
            let store = Arc::new(SnapshotStore::new(geo, config.cache_path(geo)));
            store.load();
            let aggregator = Arc::new(Aggregator::new(
                Arc::clone(&collector),
                config.categories.clone(),
                config.concurrency(),
            ));
            let coordinator =
                RefreshCoordinator::new(Arc::clone(&store), aggregator, config.refresh_interval);
            let query = QueryService::new(Arc::clone(&coordinator));
            caches.insert(
                geo.clone(),
                Arc::new(GeoCache {
                    store,
                    coordinator,
                    query,
                }),
            );
        }

        tracing::info!(
            "[registry] Serving {} geographies (default {})",
            order.len(),
            config.default_geography
        );

        Ok(Arc::new(Self {
            default_geography: config.default_geography.clone(),
            order,
            caches,
            refresh_on_start: config.refresh_on_start,
        }))
    }

    pub fn default_geography(&self) -> &str {
        &self.default_geography
    }

    /// Configured geographies, default first.
    pub fn geographies(&self) -> &[String] {
        &self.order
    }

    /// Look up a geography; `None` means the default one.
    pub fn get(&self, geography: Option<&str>) -> Result<Arc<GeoCache>> {
        let code = match geography.map(str::trim).filter(|g| !g.is_empty()) {
            Some(g) => g.to_uppercase(),
            None => self.default_geography.clone(),
        };
        self.caches
            .get(&code)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TrendCacheError::GeographyNotFound(code))
    }

    /// Spawn every geography's refresh loop. Geographies that came up empty
    /// get an immediate run when `refresh_on_start` is set.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.order.len());
        for geo in &self.order {
            let Some(cache) = self.caches.get(geo).map(|e| Arc::clone(e.value())) else {
                continue;
            };
            if self.refresh_on_start && cache.store.get().is_none() {
                tracing::info!("[registry] No cached data for {}, refreshing now", geo);
                cache.coordinator.scheduled_tick();
            }
            handles.push(tokio::spawn(Arc::clone(&cache.coordinator).run_loop()));
        }
        handles
    }

    /// Stop all refresh loops. In-flight runs finish on their own.
    pub fn shutdown(&self) {
        for entry in self.caches.iter() {
            entry.value().coordinator.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::Category;
    use crate::collector::CollectError;
    use crate::types::TrendRecord;
    use tempfile::TempDir;

    struct EmptyCollector;

    impl TrendCollector for EmptyCollector {
        fn collect(
            &self,
            _category: &Category,
            _geography: &str,
        ) -> std::result::Result<Vec<TrendRecord>, CollectError> {
            Ok(vec![])
        }
    }

    #[test]
    fn lookup_by_code() {
        let dir = TempDir::new().unwrap();
        let mut config = TrendsConfig::for_tests(dir.path());
        config.extra_geographies = vec!["US".to_string(), "IN".to_string()];
        let registry = TrendsRegistry::from_config(&config, Arc::new(EmptyCollector)).unwrap();

        assert_eq!(registry.geographies(), &["IN".to_string(), "US".to_string()]);
        assert_eq!(registry.get(None).unwrap().store.geography(), "IN");
        assert_eq!(registry.get(Some("us")).unwrap().store.geography(), "US");
        assert!(matches!(
            registry.get(Some("ZZ")),
            Err(TrendCacheError::GeographyNotFound(ref g)) if g == "ZZ"
        ));
    }

    #[tokio::test]
    async fn start_and_shutdown_loops() {
        let dir = TempDir::new().unwrap();
        let config = TrendsConfig::for_tests(dir.path());
        let registry = TrendsRegistry::from_config(&config, Arc::new(EmptyCollector)).unwrap();

        let handles = registry.start();
        assert_eq!(handles.len(), 1);
        registry.shutdown();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(registry.get(None).unwrap().coordinator.status().runs_started, 0);
    }
}
