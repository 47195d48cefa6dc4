use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::categories::Category;

/// Geography identifier, an ISO-style region code like `"IN"` or `"US"`.
pub type GeoCode = String;

/// One trending search as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    /// 1-based position within its own category. Never renumbered across categories.
    pub rank: u32,
    pub title: String,
    /// Display string such as `"100K+"`.
    #[serde(default)]
    pub traffic: Option<String>,
    pub category: String,
    pub category_id: u32,
    pub geography: GeoCode,
    #[serde(default)]
    pub started: Option<DateTime<FixedOffset>>,
    /// Absent while the trend is still active.
    #[serde(default)]
    pub ended: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub trend_breakdown: Vec<String>,
    pub explore_link: String,
    /// Capture instant. Identical for every record of one aggregation run.
    pub timestamp: DateTime<Utc>,
}

/// Build the Google Trends explore URL for a title.
pub fn explore_link(title: &str, geography: &str) -> String {
    format!(
        "https://trends.google.com/trends/explore?q={}&date=now%201-d&geo={}&hl=en-US",
        urlencoding::encode(title),
        urlencoding::encode(geography)
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub category_id: u32,
    pub category_name: String,
    pub trend_count: usize,
    pub trends: Vec<TrendRecord>,
    pub last_updated: DateTime<Utc>,
}

impl CategorySnapshot {
    pub fn new(category: &Category, trends: Vec<TrendRecord>, last_updated: DateTime<Utc>) -> Self {
        Self {
            category_id: category.id,
            category_name: category.name.to_string(),
            trend_count: trends.len(),
            trends,
            last_updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub total_trends: usize,
    pub categories_count: usize,
    pub last_updated: DateTime<Utc>,
    pub scrape_started: DateTime<Utc>,
    pub scrape_duration_seconds: f64,
    pub source: String,
}

/// One complete collected-and-merged dataset for a geography.
///
/// Built once by [`Snapshot::assemble`] and shared as `Arc<Snapshot>`; the
/// store swaps whole snapshots and never edits one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub geography: GeoCode,
    /// Keyed by category name, in collection order.
    pub categories: IndexMap<String, CategorySnapshot>,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    pub fn assemble(
        geography: &str,
        categories: IndexMap<String, CategorySnapshot>,
        scrape_started: DateTime<Utc>,
        last_updated: DateTime<Utc>,
        source: &str,
    ) -> Self {
        let total_trends = categories.values().map(|c| c.trends.len()).sum();
        let scrape_duration_seconds =
            (last_updated - scrape_started).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            geography: geography.to_string(),
            metadata: SnapshotMetadata {
                total_trends,
                categories_count: categories.len(),
                last_updated,
                scrape_started,
                scrape_duration_seconds,
                source: source.to_string(),
            },
            categories,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// All records in category order, ranks untouched.
    pub fn flatten(&self) -> Vec<TrendRecord> {
        self.categories
            .values()
            .flat_map(|c| c.trends.iter().cloned())
            .collect()
    }

    /// Check the cross-record invariants (used when loading from disk).
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let mut total = 0;
        for (name, cat) in &self.categories {
            if cat.category_name != *name {
                return Err(format!(
                    "category key '{}' holds data for '{}'",
                    name, cat.category_name
                ));
            }
            if cat.trend_count != cat.trends.len() {
                return Err(format!(
                    "'{}' claims {} trends but holds {}",
                    name,
                    cat.trend_count,
                    cat.trends.len()
                ));
            }
            for record in &cat.trends {
                if record.category != *name {
                    return Err(format!(
                        "record '{}' names category '{}' under '{}'",
                        record.title, record.category, name
                    ));
                }
                if record.geography != self.geography {
                    return Err(format!(
                        "record '{}' has geography {} in a {} snapshot",
                        record.title, record.geography, self.geography
                    ));
                }
                if record.category_id != cat.category_id {
                    return Err(format!(
                        "record '{}' has category_id {} under '{}'",
                        record.title, record.category_id, name
                    ));
                }
            }
            total += cat.trends.len();
        }
        if total != self.metadata.total_trends {
            return Err(format!(
                "metadata.total_trends is {} but {} records are present",
                self.metadata.total_trends, total
            ));
        }
        if self.categories.len() != self.metadata.categories_count {
            return Err(format!(
                "metadata.categories_count is {} but {} categories are present",
                self.metadata.categories_count,
                self.categories.len()
            ));
        }
        Ok(())
    }
}
