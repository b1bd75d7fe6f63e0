use common::storage::types::catalog_item::CatalogItem;
use serde::{Deserialize, Serialize};

use crate::{analysis::QueryAnalysis, keywords::KeywordTables, scoring::sanitize_unit};

/// Multipliers and gates of the candidate scoring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Item category equals one of the targets.
    pub exact_category_weight: f32,
    /// Item category unrelated to every target.
    pub fallback_category_weight: f32,
    pub category_match_boost: f32,
    /// Candidates whose category match score falls below this are dropped as noise.
    pub category_match_floor: f32,
    /// Number of category keyword hits that already saturates the match score.
    pub category_match_saturation: usize,
    pub unknown_category_match: f32,
    pub attribute_boost: f32,
    pub attribute_boost_gate: f32,
    pub type_promote: f32,
    pub type_demote: f32,
    pub keyword_boost: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact_category_weight: 2.0,
            fallback_category_weight: 0.7,
            category_match_boost: 0.45,
            category_match_floor: 0.12,
            category_match_saturation: 4,
            unknown_category_match: 0.5,
            attribute_boost: 0.3,
            attribute_boost_gate: 0.5,
            type_promote: 1.5,
            type_demote: 0.5,
            keyword_boost: 1.15,
        }
    }
}

/// Why a candidate left the batch during scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    CategoryMismatch,
    BelowMatchFloor,
}

/// Every factor applied to one candidate, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: f32,
    pub category_match: Option<f32>,
    pub category_weight: Option<f32>,
    pub attribute_score: f32,
    pub type_factor: f32,
    pub keyword_boosted: bool,
    pub final_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    Kept(ScoreBreakdown),
    Dropped(DropReason),
}

impl ScoreOutcome {
    pub fn final_score(&self) -> Option<f32> {
        match self {
            Self::Kept(breakdown) => Some(breakdown.final_score),
            Self::Dropped(_) => None,
        }
    }
}

/// Applies the query-dependent adjustments to a candidate's base score.
///
/// Steps run in a fixed order: category filter and weight, attribute boost, product-type
/// factor, keyword boost, final clamp. Reordering them changes rankings.
pub struct CandidateScorer<'a> {
    tables: &'a KeywordTables,
    analysis: &'a QueryAnalysis,
    weights: &'a ScoringWeights,
    boost_keywords: Vec<String>,
    targets_lower: Vec<String>,
}

impl<'a> CandidateScorer<'a> {
    pub fn new(
        tables: &'a KeywordTables,
        analysis: &'a QueryAnalysis,
        weights: &'a ScoringWeights,
        boost_keywords: &[String],
    ) -> Self {
        let boost_keywords = boost_keywords
            .iter()
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect();
        let targets_lower = analysis
            .target_categories
            .iter()
            .map(|target| target.trim().to_lowercase())
            .collect();

        Self {
            tables,
            analysis,
            weights,
            boost_keywords,
            targets_lower,
        }
    }

    /// `base` is the fused score and may exceed 1.0; only the final score is clamped.
    pub fn score(&self, item: &CatalogItem, base: f32) -> ScoreOutcome {
        let base = if base.is_finite() { base } else { 0.0 };
        let descriptive = item.descriptive_text();
        let mut score = base;

        let mut category_match = None;
        let mut category_weight = None;
        if self.analysis.has_targets() {
            let category_lower = item.category.trim().to_lowercase();
            let signals = self.category_signals(&category_lower, &descriptive);
            if !signals.passes_filter() {
                return ScoreOutcome::Dropped(DropReason::CategoryMismatch);
            }

            let match_score = signals.match_score(self.weights);
            if match_score < self.weights.category_match_floor {
                return ScoreOutcome::Dropped(DropReason::BelowMatchFloor);
            }

            let weight = self.category_weight(&category_lower, signals.exact);
            score *= weight;
            score *= self.weights.category_match_boost.mul_add(match_score, 1.0);
            category_match = Some(match_score);
            category_weight = Some(weight);
        }

        let attribute_score = self.attribute_score(&descriptive);
        if attribute_score > self.weights.attribute_boost_gate {
            score *= self.weights.attribute_boost.mul_add(attribute_score, 1.0);
        }

        let type_factor = self.type_factor(&item.name_lower());
        score *= type_factor;

        let keyword_boosted = self.keyword_boost_applies(item);
        if keyword_boosted {
            score = (score * self.weights.keyword_boost).min(1.0);
        }

        ScoreOutcome::Kept(ScoreBreakdown {
            base,
            category_match,
            category_weight,
            attribute_score,
            type_factor,
            keyword_boosted,
            final_score: sanitize_unit(score),
        })
    }

    fn category_signals(&self, category_lower: &str, descriptive: &str) -> CategorySignals {
        let exact = !category_lower.is_empty()
            && self.targets_lower.iter().any(|target| target == category_lower);

        let mut hits = 0;
        let mut possible = 0;
        for target in &self.analysis.target_categories {
            let Some(entry) = self.tables.categories.get(target) else {
                continue;
            };
            possible += entry.keywords.len();
            hits += entry.count_hits(descriptive);
        }

        CategorySignals {
            exact,
            hits,
            possible,
        }
    }

    fn category_weight(&self, category_lower: &str, exact: bool) -> f32 {
        if exact {
            return self.weights.exact_category_weight;
        }
        self.tables
            .category_affinities
            .iter()
            .find(|affinity| affinity.applies(category_lower, &self.targets_lower))
            .map_or(self.weights.fallback_category_weight, |affinity| {
                affinity.weight
            })
    }

    /// Fraction of the query's attribute mentions whose keyword the item text also carries;
    /// neutral 0.5 when the query names none.
    fn attribute_score(&self, descriptive: &str) -> f32 {
        let mentions = &self.analysis.attribute_mentions;
        if mentions.is_empty() {
            return 0.5;
        }
        let present = mentions
            .iter()
            .filter(|mention| mention.found_in(descriptive))
            .count();
        present as f32 / mentions.len() as f32
    }

    fn type_factor(&self, name_lower: &str) -> f32 {
        let Some(mention) = self.analysis.type_mention.as_ref() else {
            return 1.0;
        };
        if mention.found_in(name_lower) {
            self.weights.type_promote
        } else {
            self.weights.type_demote
        }
    }

    fn keyword_boost_applies(&self, item: &CatalogItem) -> bool {
        if self.boost_keywords.is_empty() {
            return false;
        }
        let haystack = item.content_text();
        self.boost_keywords
            .iter()
            .any(|kw| haystack.contains(kw.as_str()))
    }
}

struct CategorySignals {
    exact: bool,
    hits: usize,
    possible: usize,
}

impl CategorySignals {
    /// Coarse pre-filter. Targets without any known keywords are let through.
    const fn passes_filter(&self) -> bool {
        self.exact || self.hits > 0 || self.possible == 0
    }

    fn match_score(&self, weights: &ScoringWeights) -> f32 {
        if self.exact {
            return 1.0;
        }
        if self.possible == 0 {
            return weights.unknown_category_match;
        }
        let denominator = self
            .possible
            .min(weights.category_match_saturation)
            .max(1);
        (self.hits as f32 / denominator as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_query;

    fn speaker() -> CatalogItem {
        CatalogItem::new("X-100", "X-100 speaker", "audio equipment")
            .with_features(["waterproof", "30h battery"])
    }

    fn score_with(query: &str, item: &CatalogItem, base: f32, boosts: &[String]) -> ScoreOutcome {
        let tables = KeywordTables::default();
        let analysis = analyze_query(query, &tables, true);
        let weights = ScoringWeights::default();
        CandidateScorer::new(&tables, &analysis, &weights, boosts).score(item, base)
    }

    #[test]
    fn matching_speaker_saturates_to_one() {
        let outcome = score_with("waterproof bluetooth speaker", &speaker(), 0.87, &[]);
        let ScoreOutcome::Kept(breakdown) = outcome else {
            panic!("speaker should survive scoring");
        };

        assert_eq!(breakdown.category_match, Some(1.0));
        assert_eq!(breakdown.category_weight, Some(2.0));
        assert!((breakdown.attribute_score - 1.0).abs() < f32::EPSILON);
        assert!((breakdown.type_factor - 1.5).abs() < f32::EPSILON);
        assert!((breakdown.final_score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn unrelated_item_is_dropped_by_category_filter() {
        let lamp = CatalogItem::new("Y-200", "Y-200 desk lamp", "lighting");
        let outcome = score_with("waterproof bluetooth speaker", &lamp, 0.99, &[]);
        assert_eq!(outcome, ScoreOutcome::Dropped(DropReason::CategoryMismatch));
    }

    #[test]
    fn weak_keyword_match_falls_below_floor() {
        // One hit out of four keywords scores 0.25.
        let mut tables = KeywordTables::default();
        tables.categories = crate::keywords::KeywordTable::new(vec![
            crate::keywords::KeywordEntry::new("lighting", &["lamp", "light", "bulb", "led"]),
        ]);
        let analysis = analyze_query("a lamp please", &tables, true);
        let weights = ScoringWeights {
            category_match_floor: 0.3,
            ..ScoringWeights::default()
        };
        let item = CatalogItem::new("L-1", "Reading lamp", "furniture");

        let outcome = CandidateScorer::new(&tables, &analysis, &weights, &[]).score(&item, 0.9);
        assert_eq!(outcome, ScoreOutcome::Dropped(DropReason::BelowMatchFloor));
    }

    #[test]
    fn keyword_hits_scale_match_score() {
        let item = CatalogItem::new("E-10", "E-10 earbuds", "wearables")
            .with_description("bluetooth audio with mic");
        let tables = KeywordTables::default();
        let analysis = analyze_query("speaker", &tables, true);
        let weights = ScoringWeights::default();
        let ScoreOutcome::Kept(breakdown) =
            CandidateScorer::new(&tables, &analysis, &weights, &[]).score(&item, 0.5)
        else {
            panic!("earbuds should pass the coarse filter");
        };

        // "earbud", "mic" and "audio" hit out of a saturation of four.
        assert_eq!(breakdown.category_match, Some(0.75));
        assert_eq!(breakdown.category_weight, Some(0.7));
        assert!((breakdown.type_factor - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn affinity_weights_related_categories() {
        let projector = CatalogItem::new("P-1", "Mini projector", "projector");
        let tables = KeywordTables::default();
        let analysis = QueryAnalysis {
            target_categories: vec!["home entertainment".into()],
            ..QueryAnalysis::default()
        };
        let weights = ScoringWeights::default();
        let ScoreOutcome::Kept(breakdown) =
            CandidateScorer::new(&tables, &analysis, &weights, &[]).score(&projector, 0.2)
        else {
            panic!("projector should survive");
        };
        assert_eq!(breakdown.category_weight, Some(1.5));
    }

    fn kept(outcome: ScoreOutcome) -> ScoreBreakdown {
        match outcome {
            ScoreOutcome::Kept(breakdown) => breakdown,
            ScoreOutcome::Dropped(reason) => panic!("unexpected drop: {reason:?}"),
        }
    }

    fn score_for_targets(targets: &[&str], item: &CatalogItem, base: f32) -> ScoreBreakdown {
        let tables = KeywordTables::default();
        let analysis = QueryAnalysis {
            target_categories: targets.iter().map(|t| (*t).to_string()).collect(),
            ..QueryAnalysis::default()
        };
        let weights = ScoringWeights::default();
        kept(CandidateScorer::new(&tables, &analysis, &weights, &[]).score(item, base))
    }

    #[test]
    fn appliance_targets_weight_any_appliance_category() {
        let blender = CatalogItem::new("K-1", "K-1 vacuum blender", "kitchen appliances");
        let breakdown = score_for_targets(&["home appliances"], &blender, 0.3);

        assert_eq!(breakdown.category_weight, Some(2.0));
        assert_eq!(breakdown.category_match, Some(0.25));
    }

    #[test]
    fn audio_targets_weight_speaker_categories() {
        let speaker = CatalogItem::new("B-1", "B-1 speaker", "portable speaker");
        let breakdown = score_for_targets(&["audio equipment"], &speaker, 0.3);

        assert_eq!(breakdown.category_weight, Some(2.0));
        assert_eq!(breakdown.category_match, Some(0.25));
    }

    #[test]
    fn type_check_uses_the_keyword_the_query_used() {
        let tables = KeywordTables::default();
        let weights = ScoringWeights::default();
        let item = CatalogItem::new("Z-1", "Z-1 音箱", "audio equipment");

        let analysis = analyze_query("speaker", &tables, false);
        let breakdown =
            kept(CandidateScorer::new(&tables, &analysis, &weights, &[]).score(&item, 0.4));
        assert!((breakdown.type_factor - 0.5).abs() < f32::EPSILON);
        assert!((breakdown.final_score - 0.2).abs() < 1e-6);

        let analysis = analyze_query("音箱", &tables, false);
        let breakdown =
            kept(CandidateScorer::new(&tables, &analysis, &weights, &[]).score(&item, 0.4));
        assert!((breakdown.type_factor - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn attribute_check_uses_the_keyword_the_query_used() {
        let tables = KeywordTables::default();
        let weights = ScoringWeights::default();
        let item = CatalogItem::new("W-1", "W-1 bottle", "").with_features(["防水"]);

        let analysis = analyze_query("waterproof", &tables, false);
        let breakdown =
            kept(CandidateScorer::new(&tables, &analysis, &weights, &[]).score(&item, 0.4));
        assert!(breakdown.attribute_score.abs() < f32::EPSILON);
        assert!((breakdown.final_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn no_targets_skips_category_stage() {
        let item = CatalogItem::new("Z", "Plain thing", "");
        let ScoreOutcome::Kept(breakdown) = score_with("   ", &item, 0.42, &[]) else {
            panic!("empty query should not drop anything");
        };
        assert_eq!(breakdown.category_match, None);
        assert!((breakdown.attribute_score - 0.5).abs() < f32::EPSILON);
        assert!((breakdown.final_score - 0.42).abs() < 1e-6);
    }

    #[test]
    fn low_attribute_match_is_not_penalised() {
        let item = CatalogItem::new("X-200", "X-200 speaker", "audio equipment");
        let ScoreOutcome::Kept(breakdown) =
            score_with("waterproof speaker", &item, 0.2, &[])
        else {
            panic!("speaker should survive");
        };
        assert!(breakdown.attribute_score.abs() < f32::EPSILON);
        // 0.2 * 2.0 * 1.45 * 1.5
        assert!((breakdown.final_score - 0.87).abs() < 1e-5);
    }

    #[test]
    fn keyword_boost_is_capped_at_one_for_that_step() {
        let item = CatalogItem::new("Z", "Plain thing", "").with_content("Outdoor gear");
        let boosts = vec!["OUTDOOR".to_string(), "gear".to_string()];
        let ScoreOutcome::Kept(breakdown) = score_with("", &item, 0.5, &boosts) else {
            panic!("item should survive");
        };
        assert!(breakdown.keyword_boosted);
        assert!((breakdown.final_score - 0.575).abs() < 1e-6);

        let ScoreOutcome::Kept(capped) = score_with("", &item, 0.95, &boosts) else {
            panic!("item should survive");
        };
        assert!((capped.final_score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn nan_base_is_treated_as_zero() {
        let item = CatalogItem::new("Z", "Plain thing", "");
        assert_eq!(score_with("", &item, f32::NAN, &[]).final_score(), Some(0.0));
    }
}
