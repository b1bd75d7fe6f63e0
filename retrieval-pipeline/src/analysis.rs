use serde::Serialize;

use crate::keywords::{KeywordEntry, KeywordTables};

/// What the ranking engine learned from the raw query text. Computed once per query and
/// shared by every candidate in the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryAnalysis {
    /// Inferred categories in table order; all are equally "target".
    pub target_categories: Vec<String>,
    pub attribute_mentions: Vec<KeywordMention>,
    /// Only the first product type in table order is recognised.
    pub type_mention: Option<KeywordMention>,
}

impl QueryAnalysis {
    pub fn has_targets(&self) -> bool {
        !self.target_categories.is_empty()
    }
}

/// A table entry the query refers to, together with the keyword that triggered it.
///
/// Items are checked for `keyword` only, not for the entry's other synonyms: a query
/// saying "speaker" does not promote an item named "音箱".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordMention {
    pub name: String,
    pub keyword: String,
}

impl KeywordMention {
    fn from_entry(entry: &KeywordEntry, query_lower: &str) -> Option<Self> {
        entry.first_hit(query_lower).map(|keyword| Self {
            name: entry.name.clone(),
            keyword: keyword.to_string(),
        })
    }

    /// `haystack` must already be lower-cased.
    pub fn found_in(&self, haystack: &str) -> bool {
        haystack.contains(self.keyword.as_str())
    }
}

pub fn infer_target_categories(query: &str, tables: &KeywordTables) -> Vec<String> {
    let query_lower = query.to_lowercase();
    tables
        .categories
        .matching(&query_lower)
        .map(|entry| entry.name.clone())
        .collect()
}

pub fn extract_attribute_mentions(query: &str, tables: &KeywordTables) -> Vec<KeywordMention> {
    let query_lower = query.to_lowercase();
    tables
        .attributes
        .entries()
        .iter()
        .filter_map(|entry| KeywordMention::from_entry(entry, &query_lower))
        .collect()
}

pub fn extract_type_mention(query: &str, tables: &KeywordTables) -> Option<KeywordMention> {
    let query_lower = query.to_lowercase();
    tables
        .product_types
        .entries()
        .iter()
        .find_map(|entry| KeywordMention::from_entry(entry, &query_lower))
}

/// Runs every extractor over the query. With category weighting disabled the target set is
/// left empty so the category stage of the scorer is skipped.
pub fn analyze_query(
    query: &str,
    tables: &KeywordTables,
    enable_category_weighting: bool,
) -> QueryAnalysis {
    let target_categories = if enable_category_weighting {
        infer_target_categories(query, tables)
    } else {
        Vec::new()
    };

    QueryAnalysis {
        target_categories,
        attribute_mentions: extract_attribute_mentions(query, tables),
        type_mention: extract_type_mention(query, tables),
    }
}

/// Boost keywords implied by trigger words in the query, de-duplicated, in table order.
pub fn derive_boost_keywords(query: &str, tables: &KeywordTables) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    for pattern in &tables.boost_patterns {
        if !pattern
            .triggers
            .iter()
            .any(|trigger| query_lower.contains(trigger.as_str()))
        {
            continue;
        }
        for keyword in &pattern.boost {
            if !keywords.contains(keyword) {
                keywords.push(keyword.clone());
            }
        }
    }
    keywords
}
