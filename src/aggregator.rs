//! One aggregation run: every configured category through the collector,
//! merged into a single snapshot.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::categories::{Category, CategoryTable};
use crate::collector::{CollectError, CollectErrorKind, TrendCollector};
use crate::error::TrendCacheError;
use crate::types::{explore_link, CategorySnapshot, Snapshot, TrendRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryFailure {
    pub category_id: u32,
    pub category: String,
    pub kind: CollectErrorKind,
    pub message: String,
}

impl CategoryFailure {
    fn new(category: &Category, err: CollectError) -> Self {
        Self {
            category_id: category.id,
            category: category.name.to_string(),
            kind: err.kind,
            message: err.message,
        }
    }

    pub fn to_error(&self) -> TrendCacheError {
        TrendCacheError::CollectorFailure {
            category_id: self.category_id,
            category: self.category.clone(),
            kind: self.kind,
            message: self.message.clone(),
        }
    }
}

/// What happened during one run, category by category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub geography: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Category ids collected successfully, in mapping order.
    pub succeeded: Vec<u32>,
    pub failures: Vec<CategoryFailure>,
}

impl RunReport {
    /// No category made it; the snapshot must not replace the served one.
    pub fn is_total_failure(&self) -> bool {
        self.succeeded.is_empty()
    }

    pub fn to_error(&self) -> Option<TrendCacheError> {
        self.is_total_failure()
            .then(|| TrendCacheError::RunFailedEntirely {
                geography: self.geography.clone(),
                failures: self.failures.len(),
            })
    }
}

pub struct Aggregator {
    collector: Arc<dyn TrendCollector>,
    categories: CategoryTable,
    max_concurrency: usize,
}

impl Aggregator {
    pub fn new(
        collector: Arc<dyn TrendCollector>,
        categories: CategoryTable,
        max_concurrency: usize,
    ) -> Self {
        Self {
            collector,
            categories,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Collect every category for `geography`.
    ///
    /// Always yields a snapshot, empty if every category failed. Collector
    /// calls start in table order and at most `max_concurrency` run at once.
    pub async fn run(&self, geography: &str) -> (Snapshot, RunReport) {
        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut pending = Vec::with_capacity(self.categories.len());

        tracing::info!(
            "[aggregator {}] Collecting {} categories (concurrency {})",
            geography,
            self.categories.len(),
            self.max_concurrency
        );

        for category in self.categories.iter().copied() {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    pending.push((category, None, Some(e.to_string())));
                    continue;
                }
            };
            let collector = Arc::clone(&self.collector);
            let geo = geography.to_string();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                collector.collect(&category, &geo)
            });
            pending.push((category, Some(handle), None));
        }

        let mut collected: Vec<(Category, Vec<TrendRecord>)> = Vec::new();
        let mut failures = Vec::new();
        for (category, handle, spawn_err) in pending {
            let result = match (handle, spawn_err) {
                (Some(handle), _) => match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(CollectError::new(
                        CollectErrorKind::Other,
                        format!("collector task failed: {}", e),
                    )),
                },
                (None, err) => Err(CollectError::new(
                    CollectErrorKind::Other,
                    err.unwrap_or_else(|| "collector was not started".to_string()),
                )),
            };

            match result {
                Ok(records) => {
                    tracing::info!(
                        "[aggregator {}] {}: {} trends",
                        geography,
                        category,
                        records.len()
                    );
                    collected.push((category, records));
                }
                Err(e) => {
                    let failure = CategoryFailure::new(&category, e);
                    tracing::warn!("[aggregator {}] {}", geography, failure.to_error());
                    failures.push(failure);
                }
            }
        }

        let captured_at = Utc::now();
        let mut categories = IndexMap::with_capacity(collected.len());
        let mut succeeded = Vec::with_capacity(collected.len());
        for (category, records) in collected {
            let trends = tag_records(records, &category, geography, captured_at);
            succeeded.push(category.id);
            categories.insert(
                category.name.to_string(),
                CategorySnapshot::new(&category, trends, captured_at),
            );
        }

        let snapshot = Snapshot::assemble(
            geography,
            categories,
            started_at,
            captured_at,
            self.collector.source(),
        );
        let report = RunReport {
            geography: geography.to_string(),
            started_at,
            finished_at: captured_at,
            succeeded,
            failures,
        };

        tracing::info!(
            "[aggregator {}] Run finished in {:.1}s: {} trends, {} categories ok, {} failed",
            geography,
            snapshot.metadata.scrape_duration_seconds,
            snapshot.metadata.total_trends,
            report.succeeded.len(),
            report.failures.len()
        );

        (snapshot, report)
    }
}

/// Stamp collector output with this run's category, geography and capture time.
fn tag_records(
    records: Vec<TrendRecord>,
    category: &Category,
    geography: &str,
    captured_at: DateTime<Utc>,
) -> Vec<TrendRecord> {
    records
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .enumerate()
        .map(|(idx, mut r)| {
            if r.rank == 0 {
                r.rank = idx as u32 + 1;
            }
            r.category = category.name.to_string();
            r.category_id = category.id;
            r.geography = geography.to_string();
            if r.explore_link.trim().is_empty() {
                r.explore_link = explore_link(&r.title, geography);
            }
            r.timestamp = captured_at;
            r
        })
        .collect()
}
