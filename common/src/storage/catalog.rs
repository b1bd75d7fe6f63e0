use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    path::Path,
};

use tracing::{debug, info};

use crate::{
    error::AppError,
    storage::types::{catalog_item::CatalogItem, Identified},
};

/// Minimum partial similarity, on a 0-100 scale, for a fuzzy keyword match.
pub const FUZZY_MATCH_THRESHOLD: f64 = 50.0;

/// Read-only in-memory catalog with a simple keyword search.
///
/// Items are kept in load order; keyword search walks them in that order so results are
/// deterministic for a given catalog file.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    items: Vec<CatalogItem>,
    by_id: HashMap<String, usize>,
}

impl CatalogStore {
    pub fn from_items(items: Vec<CatalogItem>) -> Self {
        let mut store = Self::default();
        for item in items {
            store.insert(item);
        }
        store
    }

    /// Loads a JSON array of catalog records.
    pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let items: Vec<CatalogItem> = serde_json::from_str(&raw)?;
        let store = Self::from_items(items);
        info!(
            path = %path.display(),
            items = store.len(),
            "Loaded catalog"
        );
        Ok(store)
    }

    fn insert(&mut self, item: CatalogItem) {
        if let Some(&index) = self.by_id.get(item.get_id()) {
            if let Some(slot) = self.items.get_mut(index) {
                *slot = item;
            }
            return;
        }
        self.by_id.insert(item.get_id().to_owned(), self.items.len());
        self.items.push(item);
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.by_id.get(id).and_then(|&index| self.items.get(index))
    }

    pub fn require(&self, id: &str) -> Result<&CatalogItem, AppError> {
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("catalog item '{id}'")))
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Case-insensitive keyword search over name, category, price, description and features.
    ///
    /// The whole keyword is first matched as a substring. When nothing contains it, items are
    /// ranked by fuzzy partial similarity between the keyword and their name and category,
    /// keeping those scoring at least [`FUZZY_MATCH_THRESHOLD`]. Results are de-duplicated by
    /// name and category.
    pub fn keyword_search(&self, keyword: &str, limit: usize) -> Vec<CatalogItem> {
        let keyword_lower = keyword.trim().to_lowercase();
        if keyword_lower.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for item in &self.items {
            if matches.len() >= limit {
                break;
            }
            if !searchable_text(item).contains(&keyword_lower) {
                continue;
            }
            if seen.insert(dedup_key(item)) {
                matches.push(item.clone());
            }
        }

        if !matches.is_empty() {
            debug!(hits = matches.len(), "Keyword search matched by substring");
            return matches;
        }

        let mut scored: Vec<(f64, &CatalogItem)> = self
            .items
            .iter()
            .map(|item| (partial_similarity(&keyword_lower, &fuzzy_candidate(item)), item))
            .filter(|(similarity, _)| *similarity >= FUZZY_MATCH_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut seen = HashSet::new();
        let results: Vec<CatalogItem> = scored
            .into_iter()
            .filter(|(_, item)| seen.insert(dedup_key(item)))
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect();

        debug!(
            hits = results.len(),
            threshold = FUZZY_MATCH_THRESHOLD,
            "Keyword search fell back to fuzzy matching"
        );
        results
    }
}

fn searchable_text(item: &CatalogItem) -> String {
    format!(
        "{} {} {} {} {}",
        item.name,
        item.category,
        item.price,
        item.description,
        item.features.join(" ")
    )
    .to_lowercase()
}

fn dedup_key(item: &CatalogItem) -> String {
    format!("{}||{}", item.name, item.category)
}

/// Name (or id) and category (or source), lower-cased, as compared by the fuzzy fallback.
fn fuzzy_candidate(item: &CatalogItem) -> String {
    let name = if item.name.is_empty() { &item.id } else { &item.name };
    let category = if item.category.is_empty() {
        item.source.as_deref().unwrap_or_default()
    } else {
        item.category.as_str()
    };
    format!("{name} {category}").to_lowercase()
}

/// Best similarity, scaled to 0-100, between the shorter string and any equally long
/// window of the longer one.
fn partial_similarity(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    let (short, long) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    if short.is_empty() {
        return 0.0;
    }

    let needle: String = short.iter().collect();
    long.windows(short.len())
        .map(|window| {
            let window: String = window.iter().collect();
            strsim::normalized_levenshtein(&needle, &window)
        })
        .fold(0.0, f64::max)
        * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> CatalogStore {
        CatalogStore::from_items(vec![
            CatalogItem::new("X-100", "X-100 speaker", "audio equipment")
                .with_features(["waterproof", "30h battery"]),
            CatalogItem::new("E-10", "E-10 earbuds", "audio equipment")
                .with_features(["noise-canceling"]),
            CatalogItem::new("Y-200", "Y-200 desk lamp", "computer peripherals")
                .with_description("eye care lamp for long sessions"),
        ])
    }

    #[test]
    fn substring_match_keeps_catalog_order() {
        let store = sample_store();
        let hits = store.keyword_search("AUDIO", 10);
        let ids: Vec<_> = hits.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["X-100", "E-10"]);
    }

    #[test]
    fn falls_back_to_fuzzy_name_match() {
        let store = sample_store();
        let hits = store.keyword_search("speakr", 10);
        let ids: Vec<_> = hits.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["X-100"]);
    }

    #[test]
    fn fuzzy_fallback_matches_unsegmented_cjk_queries() {
        let store = CatalogStore::from_items(vec![
            CatalogItem::new("X-100", "X-100 藍牙喇叭", "audio equipment"),
            CatalogItem::new("Y-200", "Y-200 desk lamp", "lighting"),
        ]);

        let hits = store.keyword_search("防水的藍牙喇叭", 10);
        let ids: Vec<_> = hits.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["X-100"]);
    }

    #[test]
    fn fuzzy_fallback_drops_weak_matches() {
        let store = sample_store();
        assert!(store.keyword_search("xyzzy qqq", 10).is_empty());
        assert!(
            partial_similarity("防水的藍牙喇叭", "x-100 藍牙喇叭 audio equipment")
                >= FUZZY_MATCH_THRESHOLD
        );
        assert!(partial_similarity("waterproof", "") < FUZZY_MATCH_THRESHOLD);
    }

    #[test]
    fn respects_limit_and_empty_queries() {
        let store = sample_store();
        assert_eq!(store.keyword_search("audio", 1).len(), 1);
        assert!(store.keyword_search("   ", 5).is_empty());
        assert!(store.keyword_search("audio", 0).is_empty());
    }

    #[test]
    fn later_records_replace_earlier_ones_with_same_id() {
        let store = CatalogStore::from_items(vec![
            CatalogItem::new("A", "first", ""),
            CatalogItem::new("A", "second", ""),
        ]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.require("A").map(|item| item.name.as_str()).ok(), Some("second"));
        assert!(matches!(store.require("missing"), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn loads_catalog_from_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        tokio::fs::write(
            &path,
            r#"[{"product_id": "X-100", "name": "X-100 speaker", "features": ["waterproof"]}]"#,
        )
        .await
        .expect("write catalog");

        let store = CatalogStore::load_from_path(&path)
            .await
            .expect("catalog should load");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("X-100").map(|item| item.features.len()), Some(1));
    }
}
