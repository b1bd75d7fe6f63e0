use std::{fmt, sync::Arc};

use common::{
    error::AppError,
    storage::types::{catalog_item::CatalogItem, Identified},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    analysis::{analyze_query, QueryAnalysis},
    keywords::KeywordTables,
    scorer::{CandidateScorer, DropReason, ScoreBreakdown, ScoreOutcome, ScoringWeights},
    scoring::{dedup_by_id, sanitize_unit, sort_by_fused_desc, CandidatePool, FusionWeights, Scored},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPath {
    Lexical,
    Vector,
}

impl fmt::Display for RetrievalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
        })
    }
}

/// One candidate as produced by a retrieval path, before any fusion.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub item: CatalogItem,
    pub base_score: f32,
    pub path: RetrievalPath,
}

impl RawCandidate {
    pub fn lexical(item: CatalogItem, base_score: f32) -> Self {
        Self {
            item,
            base_score,
            path: RetrievalPath::Lexical,
        }
    }

    pub fn vector(item: CatalogItem, base_score: f32) -> Self {
        Self {
            item,
            base_score,
            path: RetrievalPath::Vector,
        }
    }

    fn into_scored(self) -> Scored<CatalogItem> {
        let score = sanitize_unit(self.base_score);
        let scored = Scored::new(self.item);
        match self.path {
            RetrievalPath::Lexical => scored.with_lexical_score(score),
            RetrievalPath::Vector => scored.with_vector_score(score),
        }
    }
}

/// A ranked item together with the signals that produced its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub item: CatalogItem,
    /// Final score in `[0, 1]`.
    pub score: f32,
    pub fused_base: f32,
    pub lexical_component: f32,
    pub vector_component: f32,
    pub breakdown: ScoreBreakdown,
}

/// Per-call knobs of a ranking request.
#[derive(Debug, Clone)]
pub struct RankOptions {
    pub limit: usize,
    pub score_threshold: f32,
    pub weights: FusionWeights,
    pub enable_category_weighting: bool,
    pub boost_keywords: Vec<String>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            score_threshold: 0.5,
            weights: FusionWeights::default(),
            enable_category_weighting: true,
            boost_keywords: Vec::new(),
        }
    }
}

impl RankOptions {
    /// Rejects options that cannot produce a meaningful ranking.
    ///
    /// A `limit` of zero is a [`AppError::Validation`] error rather than an empty result, so a
    /// misconfigured caller fails before any retriever is queried. The threshold must lie in
    /// `[0, 1]` and both fusion weights must be finite and non-negative.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.limit == 0 {
            return Err(AppError::Validation("limit must be at least 1".into()));
        }
        if !self.score_threshold.is_finite() || !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(AppError::Validation(format!(
                "score_threshold must be within [0, 1], got {}",
                self.score_threshold
            )));
        }
        if !self.weights.is_valid() {
            return Err(AppError::Validation(format!(
                "fusion weights must be finite and non-negative, got lexical={} vector={}",
                self.weights.lexical, self.weights.vector
            )));
        }
        Ok(())
    }
}

/// Counters describing what happened to the candidates of one ranking call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RankReport {
    pub merged: usize,
    pub malformed: usize,
    pub category_mismatch: usize,
    pub below_match_floor: usize,
    pub below_threshold: usize,
    pub duplicates: usize,
    pub truncated: usize,
}

#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub results: Vec<ScoredResult>,
    pub report: RankReport,
}

/// Turns scored lexical and vector candidates for one query into the final ranked list.
///
/// The engine is synchronous and holds no mutable state; one instance can serve any number
/// of concurrent calls.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    tables: Arc<KeywordTables>,
    scoring: ScoringWeights,
}

impl FusionEngine {
    pub fn new(tables: Arc<KeywordTables>, scoring: ScoringWeights) -> Self {
        Self { tables, scoring }
    }

    pub fn tables(&self) -> &KeywordTables {
        &self.tables
    }

    pub fn analyze(&self, query: &str, enable_category_weighting: bool) -> QueryAnalysis {
        analyze_query(query, &self.tables, enable_category_weighting)
    }

    pub fn rank(
        &self,
        query: &str,
        lexical: Vec<RawCandidate>,
        vector: Vec<RawCandidate>,
        options: &RankOptions,
    ) -> Result<Vec<ScoredResult>, AppError> {
        self.rank_with_report(query, lexical, vector, options)
            .map(|outcome| outcome.results)
    }

    /// Fuses both paths with the configured weights. An empty list stands for an unavailable
    /// path; its component is zero for every item.
    #[instrument(level = "trace", skip_all, fields(lexical = lexical.len(), vector = vector.len()))]
    pub fn rank_with_report(
        &self,
        query: &str,
        lexical: Vec<RawCandidate>,
        vector: Vec<RawCandidate>,
        options: &RankOptions,
    ) -> Result<RankOutcome, AppError> {
        options.validate()?;

        let mut report = RankReport::default();
        let merged = fuse_candidates(lexical, vector, options.weights, &mut report);
        let analysis = self.analyze(query, options.enable_category_weighting);
        Ok(self.select(&analysis, merged, options, report))
    }

    /// Ranks candidates from a single path without fusion: the path score itself is the
    /// base handed to the scorer.
    #[instrument(level = "trace", skip_all, fields(candidates = candidates.len()))]
    pub fn rank_single_path(
        &self,
        query: &str,
        candidates: Vec<RawCandidate>,
        options: &RankOptions,
    ) -> Result<RankOutcome, AppError> {
        options.validate()?;

        let mut report = RankReport::default();
        let merged = single_path_candidates(candidates, &mut report);
        let analysis = self.analyze(query, options.enable_category_weighting);
        Ok(self.select(&analysis, merged, options, report))
    }

    /// Scores merged candidates, applies the threshold, then sorts, de-duplicates and
    /// truncates. `merged` must carry the base score in `fused`.
    pub fn select(
        &self,
        analysis: &QueryAnalysis,
        merged: Vec<Scored<CatalogItem>>,
        options: &RankOptions,
        mut report: RankReport,
    ) -> RankOutcome {
        report.merged = merged.len();

        let scorer = CandidateScorer::new(
            &self.tables,
            analysis,
            &self.scoring,
            &options.boost_keywords,
        );

        let mut survivors: Vec<Scored<ScoredResult>> = Vec::with_capacity(merged.len());
        for entry in merged {
            let breakdown = match scorer.score(&entry.item, entry.fused) {
                ScoreOutcome::Kept(breakdown) => breakdown,
                ScoreOutcome::Dropped(DropReason::CategoryMismatch) => {
                    report.category_mismatch += 1;
                    continue;
                }
                ScoreOutcome::Dropped(DropReason::BelowMatchFloor) => {
                    report.below_match_floor += 1;
                    continue;
                }
            };

            if breakdown.final_score < options.score_threshold {
                report.below_threshold += 1;
                continue;
            }

            let mut scored = Scored::new(ScoredResult {
                item: entry.item,
                score: breakdown.final_score,
                fused_base: entry.fused,
                lexical_component: entry.scores.lexical.unwrap_or(0.0),
                vector_component: entry.scores.vector.unwrap_or(0.0),
                breakdown,
            });
            scored.update_fused(breakdown.final_score);
            survivors.push(scored);
        }

        sort_by_fused_desc(&mut survivors);
        report.duplicates = dedup_by_id(&mut survivors);
        if survivors.len() > options.limit {
            report.truncated = survivors.len() - options.limit;
            survivors.truncate(options.limit);
        }

        debug!(
            merged = report.merged,
            kept = survivors.len(),
            dropped_category = report.category_mismatch,
            dropped_floor = report.below_match_floor,
            dropped_threshold = report.below_threshold,
            "Ranking finished"
        );

        RankOutcome {
            results: survivors.into_iter().map(|scored| scored.item).collect(),
            report,
        }
    }
}

/// Merges both paths by item id, lexical first, and computes the weighted fused base.
pub fn fuse_candidates(
    lexical: Vec<RawCandidate>,
    vector: Vec<RawCandidate>,
    weights: FusionWeights,
    report: &mut RankReport,
) -> Vec<Scored<CatalogItem>> {
    let mut pool = CandidatePool::new();
    pool.merge(admit(lexical, report));
    pool.merge(admit(vector, report));
    pool.apply_fusion(weights);
    pool.into_vec()
}

/// Merges one path by item id and uses the best path score as the base.
pub fn single_path_candidates(
    candidates: Vec<RawCandidate>,
    report: &mut RankReport,
) -> Vec<Scored<CatalogItem>> {
    let mut pool = CandidatePool::new();
    pool.merge(admit(candidates, report));

    let mut merged = pool.into_vec();
    for entry in &mut merged {
        let base = match (entry.scores.lexical, entry.scores.vector) {
            (Some(l), Some(v)) => l.max(v),
            (l, v) => l.or(v).unwrap_or(0.0),
        };
        entry.update_fused(base);
    }
    merged
}

fn admit(candidates: Vec<RawCandidate>, report: &mut RankReport) -> Vec<Scored<CatalogItem>> {
    candidates
        .into_iter()
        .filter_map(|candidate| match candidate.item.ensure_identity() {
            Ok(()) => Some(candidate.into_scored()),
            Err(err) => {
                debug!(path = %candidate.path, error = %err, "Skipping malformed candidate");
                report.malformed += 1;
                None
            }
        })
        .collect()
}

impl Identified for ScoredResult {
    fn get_id(&self) -> &str {
        &self.item.id
    }
}
