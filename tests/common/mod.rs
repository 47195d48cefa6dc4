use axum::{body::Body, http::Request, Router};
use chrono::Utc;
use http_body_util::BodyExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use trendcache::{
    CategoryTable, CollectError, CollectErrorKind, TrendCollector, TrendRecord, TrendsConfig,
    TrendsRegistry,
};
use trendcache::categories::Category;

/// Deterministic collector: `per_category` records per call, optional delay,
/// and a switchable set of failing category ids.
pub struct FakeCollector {
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub per_category: usize,
    pub delay: Duration,
    failing: Mutex<HashSet<u32>>,
}

#[allow(dead_code)]
impl FakeCollector {
    pub fn new(per_category: usize, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            per_category,
            delay: Duration::from_millis(delay_ms),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail(&self, ids: &[u32]) {
        let mut failing = self.failing.lock().unwrap();
        failing.clear();
        failing.extend(ids.iter().copied());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrendCollector for FakeCollector {
    fn collect(
        &self,
        category: &Category,
        geography: &str,
    ) -> Result<Vec<TrendRecord>, CollectError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&category.id) {
            return Err(CollectError::new(
                CollectErrorKind::Timeout,
                format!("timed out on {}", category.name),
            ));
        }

        Ok((0..self.per_category)
            .map(|i| TrendRecord {
                rank: i as u32 + 1,
                title: format!("{} topic {} call {}", category.name.to_lowercase(), i + 1, call),
                traffic: Some(format!("{}K+", (self.per_category - i) * 10)),
                category: category.name.to_string(),
                category_id: category.id,
                geography: geography.to_string(),
                started: None,
                ended: None,
                trend_breakdown: vec![format!("related {}", i)],
                explore_link: String::new(),
                timestamp: Utc::now(),
            })
            .collect())
    }

    fn source(&self) -> &str {
        "fake"
    }
}

#[allow(dead_code)]
pub fn test_config(dir: &TempDir, categories: &str) -> TrendsConfig {
    let mut config = TrendsConfig::for_tests(dir.path());
    config.categories = CategoryTable::parse(categories).unwrap();
    config
}

#[allow(dead_code)]
pub fn registry(config: &TrendsConfig, collector: Arc<FakeCollector>) -> Arc<TrendsRegistry> {
    TrendsRegistry::from_config(config, collector).unwrap()
}

#[allow(dead_code)]
pub fn app(registry: Arc<TrendsRegistry>) -> Router {
    trendcache_http::build_router(Arc::new(trendcache_http::handlers::AppState { registry }))
}

#[allow(dead_code)]
pub async fn send(app: &Router, method: &str, uri: &str) -> (u16, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
