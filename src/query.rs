//! Read side: shape the current snapshot into a response.
//!
//! Queries look at `store.get()`, or at a snapshot the caller already holds
//! (the result of a force refresh). They never wait for a refresh.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::coordinator::{CacheInfo, RefreshCoordinator};
use crate::error::{Result, TrendCacheError};
use crate::types::{CategorySnapshot, Snapshot, TrendRecord};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrendsQuery {
    #[serde(default = "default_flat")]
    pub flat: bool,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_flat() -> bool {
    true
}

impl Default for TrendsQuery {
    fn default() -> Self {
        Self {
            flat: true,
            category: None,
        }
    }
}

/// Snapshot metadata as served. Everything but the counts is null before
/// the first successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub total_trends: usize,
    pub categories_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub scrape_started: Option<DateTime<Utc>>,
    pub scrape_duration_seconds: Option<f64>,
    pub source: Option<String>,
}

impl ResponseMetadata {
    fn empty() -> Self {
        Self {
            total_trends: 0,
            categories_count: 0,
            last_updated: None,
            scrape_started: None,
            scrape_duration_seconds: None,
            source: None,
        }
    }

    fn of(snapshot: &Snapshot) -> Self {
        let m = &snapshot.metadata;
        Self {
            total_trends: m.total_trends,
            categories_count: m.categories_count,
            last_updated: Some(m.last_updated),
            scrape_started: Some(m.scrape_started),
            scrape_duration_seconds: Some(m.scrape_duration_seconds),
            source: Some(m.source.clone()),
        }
    }
}

/// Serialized as a plain array (flat) or a mapping keyed by category name.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TrendsView {
    Flat(Vec<TrendRecord>),
    Grouped(IndexMap<String, CategorySnapshot>),
}

impl TrendsView {
    pub fn as_flat(&self) -> Option<&[TrendRecord]> {
        match self {
            TrendsView::Flat(trends) => Some(trends),
            TrendsView::Grouped(_) => None,
        }
    }

    pub fn as_grouped(&self) -> Option<&IndexMap<String, CategorySnapshot>> {
        match self {
            TrendsView::Flat(_) => None,
            TrendsView::Grouped(categories) => Some(categories),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendsResponse {
    pub status: &'static str,
    pub geography: String,
    pub metadata: ResponseMetadata,
    pub trends: TrendsView,
    /// Flat mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    pub cache_info: CacheInfo,
}

pub struct QueryService {
    coordinator: Arc<RefreshCoordinator>,
}

impl QueryService {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn query(&self, query: &TrendsQuery) -> Result<TrendsResponse> {
        self.query_snapshot(self.coordinator.store().get(), query)
    }

    /// Shape `snapshot` instead of whatever the store holds now. A force
    /// refresh answers from the snapshot its own run produced, even if a
    /// later run has already replaced it.
    pub fn query_snapshot(
        &self,
        snapshot: Option<Arc<Snapshot>>,
        query: &TrendsQuery,
    ) -> Result<TrendsResponse> {
        let (metadata, categories) = match snapshot.as_deref() {
            Some(snap) => (
                ResponseMetadata::of(snap),
                select_categories(snap, query.category.as_deref())?,
            ),
            None => (ResponseMetadata::empty(), IndexMap::new()),
        };

        let (trends, total_count) = if query.flat {
            let trends: Vec<TrendRecord> = categories
                .values()
                .flat_map(|c| c.trends.iter().cloned())
                .collect();
            let count = trends.len();
            (TrendsView::Flat(trends), Some(count))
        } else {
            (TrendsView::Grouped(categories), None)
        };

        Ok(TrendsResponse {
            status: "success",
            geography: self.coordinator.geography().to_string(),
            metadata,
            trends,
            total_count,
            cache_info: self.coordinator.cache_info(),
        })
    }
}

/// The whole mapping, or the one category named by `filter` (case-insensitive).
fn select_categories(
    snapshot: &Snapshot,
    filter: Option<&str>,
) -> Result<IndexMap<String, CategorySnapshot>> {
    let Some(wanted) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return Ok(snapshot.categories.clone());
    };
    snapshot
        .categories
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(name, cat)| IndexMap::from([(name.clone(), cat.clone())]))
        .ok_or_else(|| TrendCacheError::CategoryNotFound(wanted.to_string()))
}
