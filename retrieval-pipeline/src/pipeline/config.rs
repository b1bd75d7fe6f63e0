use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use common::{storage::types::catalog_item::CATALOG_SOURCE, utils::config::AppConfig};

use crate::{fusion::RankOptions, scorer::ScoringWeights, scoring::FusionWeights};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Lexical and vector retrieval fused with weighted linear combination
    #[default]
    Hybrid,
    /// Vector retrieval only; similarity is the base score
    Semantic,
    /// Keyword retrieval only; rank pseudo-scores are the base score
    Lexical,
}

impl std::str::FromStr for RetrievalStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "semantic" | "vector" => Ok(Self::Semantic),
            "lexical" | "keyword" | "bm25" => Ok(Self::Lexical),
            other => Err(format!("unknown retrieval strategy '{other}'")),
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RetrievalStrategy::Hybrid => "hybrid",
            RetrievalStrategy::Semantic => "semantic",
            RetrievalStrategy::Lexical => "lexical",
        };
        f.write_str(label)
    }
}

/// How the query was phrased. Selects the default fusion weights and whether boost keywords
/// are derived from the query text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum QueryStyle {
    /// Short keyword-rich queries such as "waterproof bluetooth speaker"
    #[default]
    KeywordBoosted,
    /// Descriptive sentences such as "something to protect my eyes at night"
    NaturalLanguage,
}

impl QueryStyle {
    pub const fn default_weights(self) -> FusionWeights {
        match self {
            Self::KeywordBoosted => FusionWeights::keyword_boosted(),
            Self::NaturalLanguage => FusionWeights::natural_language(),
        }
    }

    pub const fn derives_boost_keywords(self) -> bool {
        matches!(self, Self::KeywordBoosted)
    }
}

impl std::str::FromStr for QueryStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "keyword_boosted" | "keyword" => Ok(Self::KeywordBoosted),
            "natural_language" | "natural" => Ok(Self::NaturalLanguage),
            other => Err(format!("unknown query style '{other}'")),
        }
    }
}

impl fmt::Display for QueryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryStyle::KeywordBoosted => "keyword_boosted",
            QueryStyle::NaturalLanguage => "natural_language",
        };
        f.write_str(label)
    }
}

/// Tunable parameters that govern each retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalTuning {
    pub result_limit: usize,
    /// Results scoring below this are never returned. Same-category hits cluster above 0.9
    /// while off-category noise stays under 0.45.
    pub score_threshold: f32,
    /// Raw similarity a vector hit needs before it enters fusion.
    pub vector_min_similarity: f32,
    /// Each retriever is asked for `result_limit * candidate_multiplier` hits.
    pub candidate_multiplier: usize,
    pub catalog_source: String,
    pub enable_category_weighting: bool,
    /// Overrides the query style's default lexical weight when set.
    pub lexical_weight: Option<f32>,
    /// Overrides the query style's default vector weight when set.
    pub vector_weight: Option<f32>,
    pub retrieval_timeout_ms: Option<u64>,
    pub scoring: ScoringWeights,
}

impl Default for RetrievalTuning {
    fn default() -> Self {
        Self {
            result_limit: 10,
            score_threshold: 0.5,
            vector_min_similarity: 0.2,
            candidate_multiplier: 3,
            catalog_source: CATALOG_SOURCE.to_string(),
            enable_category_weighting: true,
            lexical_weight: None,
            vector_weight: None,
            retrieval_timeout_ms: None,
            scoring: ScoringWeights::default(),
        }
    }
}

impl RetrievalTuning {
    /// Overlays values set in the application config.
    pub fn apply_app_config(&mut self, config: &AppConfig) {
        if let Some(threshold) = config.score_threshold {
            self.score_threshold = threshold;
        }
        if let Some(limit) = config.result_limit {
            self.result_limit = limit;
        }
        if let Some(enabled) = config.enable_category_weighting {
            self.enable_category_weighting = enabled;
        }
        if config.retrieval_timeout_ms.is_some() {
            self.retrieval_timeout_ms = config.retrieval_timeout_ms;
        }
        if config.lexical_weight.is_some() {
            self.lexical_weight = config.lexical_weight;
        }
        if config.vector_weight.is_some() {
            self.vector_weight = config.vector_weight;
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut tuning = Self::default();
        tuning.apply_app_config(config);
        tuning
    }

    pub fn candidate_take(&self) -> usize {
        self.result_limit.saturating_mul(self.candidate_multiplier.max(1))
    }

    pub fn retrieval_timeout(&self) -> Option<Duration> {
        self.retrieval_timeout_ms.map(Duration::from_millis)
    }
}

/// Wrapper containing tuning plus per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfig {
    pub strategy: RetrievalStrategy,
    pub style: QueryStyle,
    pub tuning: RetrievalTuning,
    /// Caller-supplied boost keywords. When `None`, keyword-boosted queries derive them from
    /// the query text.
    pub boost_keywords: Option<Vec<String>>,
}

impl RetrievalConfig {
    pub fn new(tuning: RetrievalTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    pub fn with_strategy(strategy: RetrievalStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_tuning(strategy: RetrievalStrategy, tuning: RetrievalTuning) -> Self {
        Self {
            strategy,
            tuning,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn style(mut self, style: QueryStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn boost_keywords(mut self, keywords: Vec<String>) -> Self {
        self.boost_keywords = Some(keywords);
        self
    }

    /// Style defaults with any configured per-path override applied on top.
    pub fn fusion_weights(&self) -> FusionWeights {
        let defaults = self.style.default_weights();
        FusionWeights {
            lexical: self.tuning.lexical_weight.unwrap_or(defaults.lexical),
            vector: self.tuning.vector_weight.unwrap_or(defaults.vector),
        }
    }

    pub fn rank_options(&self, boost_keywords: Vec<String>) -> RankOptions {
        RankOptions {
            limit: self.tuning.result_limit,
            score_threshold: self.tuning.score_threshold,
            weights: self.fusion_weights(),
            enable_category_weighting: self.tuning.enable_category_weighting,
            boost_keywords,
        }
    }
}
