//! The collector boundary: fetch one category's trend list for a geography.
//!
//! The core never scrapes anything itself. It talks to a [`TrendCollector`],
//! which tests replace with deterministic fakes and the server binary backs
//! with [`CommandCollector`] (an external scraper program).

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;

use crate::categories::Category;
use crate::types::{explore_link, TrendRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectErrorKind {
    Timeout,
    Unavailable,
    Parse,
    Empty,
    Other,
}

impl std::fmt::Display for CollectErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectErrorKind::Timeout => "timeout",
            CollectErrorKind::Unavailable => "unavailable",
            CollectErrorKind::Parse => "parse",
            CollectErrorKind::Empty => "empty",
            CollectErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectError {
    pub kind: CollectErrorKind,
    pub message: String,
}

impl CollectError {
    pub fn new(kind: CollectErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CollectError {}

/// Fetches the ordered trend list of one category.
///
/// Calls are blocking and may take tens of seconds; the aggregator runs them
/// on the blocking pool with bounded concurrency. Implementations must be
/// safe to call back-to-back for different categories.
pub trait TrendCollector: Send + Sync {
    fn collect(
        &self,
        category: &Category,
        geography: &str,
    ) -> std::result::Result<Vec<TrendRecord>, CollectError>;

    /// Label stored in `metadata.source`.
    fn source(&self) -> &str {
        "collector"
    }
}

/// A row as emitted by an external scraper.
///
/// `started` and `ended` must be RFC 3339 (`2026-10-17T09:30:00+05:30`).
/// Anything else is logged and dropped; the row itself is kept.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrendRow {
    #[serde(default)]
    pub rank: Option<u32>,
    pub title: String,
    #[serde(default)]
    pub traffic: Option<String>,
    #[serde(default)]
    pub started: Option<String>,
    #[serde(default)]
    pub ended: Option<String>,
    #[serde(default)]
    pub trend_breakdown: Option<Breakdown>,
    #[serde(default)]
    pub explore_link: Option<String>,
}

/// Related queries, either a JSON list or the export's comma-joined string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Breakdown {
    List(Vec<String>),
    Joined(String),
}

impl Breakdown {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            Breakdown::List(items) => items,
            Breakdown::Joined(s) => s.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn parse_offset_time(value: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!(
                "[collector] Dropping non-RFC 3339 time '{}': {}",
                value,
                e
            );
            None
        }
    }
}

/// Turn scraper rows into records. Blank titles are dropped; missing ranks
/// fall back to the row's position among kept rows.
pub fn rows_to_records(
    rows: Vec<RawTrendRow>,
    category: &Category,
    geography: &str,
) -> Vec<TrendRecord> {
    let captured = Utc::now();
    rows.into_iter()
        .filter(|row| !row.title.trim().is_empty())
        .enumerate()
        .map(|(idx, row)| {
            let title = row.title.trim().to_lowercase();
            let explore = row
                .explore_link
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| explore_link(&title, geography));
            TrendRecord {
                rank: row.rank.filter(|r| *r > 0).unwrap_or(idx as u32 + 1),
                traffic: row.traffic.filter(|t| !t.trim().is_empty()),
                category: category.name.to_string(),
                category_id: category.id,
                geography: geography.to_string(),
                started: parse_offset_time(row.started.as_deref()),
                ended: parse_offset_time(row.ended.as_deref()),
                trend_breakdown: row
                    .trend_breakdown
                    .map(Breakdown::into_vec)
                    .unwrap_or_default(),
                explore_link: explore,
                timestamp: captured,
                title,
            }
        })
        .collect()
}

/// Runs `<program> <args..> <category_id> <geography>` and reads a JSON
/// array of [`RawTrendRow`] from its stdout.
#[derive(Debug, Clone)]
pub struct CommandCollector {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCollector {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl TrendCollector for CommandCollector {
    fn collect(
        &self,
        category: &Category,
        geography: &str,
    ) -> std::result::Result<Vec<TrendRecord>, CollectError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(category.id.to_string())
            .arg(geography)
            .output()
            .map_err(|e| {
                CollectError::new(
                    CollectErrorKind::Unavailable,
                    format!("failed to spawn {}: {}", self.program.display(), e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectError::new(
                CollectErrorKind::Unavailable,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        let rows: Vec<RawTrendRow> = serde_json::from_slice(&output.stdout)
            .map_err(|e| CollectError::new(CollectErrorKind::Parse, e.to_string()))?;
        let records = rows_to_records(rows, category, geography);
        if records.is_empty() {
            return Err(CollectError::new(
                CollectErrorKind::Empty,
                format!("no trends returned for {}", category),
            ));
        }
        Ok(records)
    }

    fn source(&self) -> &str {
        "command_collector"
    }
}
