//! The fixed trend category enumeration.
//!
//! Upstream also exposes id `0` ("All Categories"), which overlaps every
//! other category and is never collected.

use crate::error::{Result, TrendCacheError};
use serde::Serialize;

/// Collection order. The grouped response lists categories in this order.
const CATEGORIES: [(u32, &str); 19] = [
    (1, "Autos and vehicles"),
    (2, "Beauty and fashion"),
    (3, "Business and finance"),
    (20, "Climate"),
    (4, "Entertainment"),
    (5, "Food and drink"),
    (6, "Games"),
    (7, "Health"),
    (8, "Hobbies and leisure"),
    (9, "Jobs and education"),
    (10, "Law and government"),
    (11, "Other"),
    (13, "Pets and animals"),
    (14, "Politics"),
    (15, "Science"),
    (16, "Shopping"),
    (17, "Sports"),
    (18, "Technology"),
    (19, "Travel and transportation"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Category {
    pub id: u32,
    pub name: &'static str,
}

impl Category {
    pub fn all() -> Vec<Category> {
        CATEGORIES
            .iter()
            .map(|&(id, name)| Category { id, name })
            .collect()
    }

    pub fn by_id(id: u32) -> Option<Category> {
        CATEGORIES
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|&(id, name)| Category { id, name })
    }

    pub fn by_name(name: &str) -> Option<Category> {
        CATEGORIES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|&(id, name)| Category { id, name })
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// The categories one aggregation run walks, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    categories: Vec<Category>,
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            categories: Category::all(),
        }
    }
}

impl CategoryTable {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// Parse a comma-separated id list such as `"4,17,18"`.
    ///
    /// Order is kept, duplicates are dropped. An empty list yields the full table.
    pub fn parse(ids: &str) -> Result<Self> {
        let mut categories: Vec<Category> = Vec::new();
        for part in ids.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id: u32 = part
                .parse()
                .map_err(|_| TrendCacheError::Config(format!("invalid category id '{}'", part)))?;
            let category = Category::by_id(id)
                .ok_or_else(|| TrendCacheError::Config(format!("unknown category id {}", id)))?;
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
        if categories.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { categories })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
