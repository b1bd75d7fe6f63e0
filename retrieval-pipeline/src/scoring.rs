use std::{cmp::Ordering, collections::HashMap, collections::HashSet};

use common::storage::types::Identified;
use serde::{Deserialize, Serialize};

/// Per-path base scores gathered for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub lexical: Option<f32>,
    pub vector: Option<f32>,
}

/// Generic wrapper combining an item with its accumulated retrieval scores.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub scores: Scores,
    pub fused: f32,
}

impl<T> Scored<T> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            scores: Scores::default(),
            fused: 0.0,
        }
    }

    pub const fn with_vector_score(mut self, score: f32) -> Self {
        self.scores.vector = Some(score);
        self
    }

    pub const fn with_lexical_score(mut self, score: f32) -> Self {
        self.scores.lexical = Some(score);
        self
    }

    pub fn update_fused(&mut self, fused: f32) {
        self.fused = fused;
    }
}

/// Weights used for linear score fusion. They need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl FusionWeights {
    /// Keyword-rich queries lean a little more on the lexical path.
    pub const fn keyword_boosted() -> Self {
        Self {
            lexical: 0.4,
            vector: 0.6,
        }
    }

    pub const fn natural_language() -> Self {
        Self {
            lexical: 0.35,
            vector: 0.65,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lexical.is_finite()
            && self.vector.is_finite()
            && self.lexical >= 0.0
            && self.vector >= 0.0
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::keyword_boosted()
    }
}

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Clamps to `[0, 1]`, mapping NaN to zero.
pub fn sanitize_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    clamp_unit(value)
}

/// Pseudo-score for a lexical hit at zero-based `rank` out of `total` hits: the top hit
/// scores 1.0 and later hits decay toward zero.
pub fn rank_to_score(rank: usize, total: usize) -> f32 {
    let denominator = total.saturating_add(1) as f32;
    clamp_unit(1.0 - rank as f32 / denominator)
}

/// Weighted linear combination. A missing path contributes zero.
pub fn fuse_scores(scores: &Scores, weights: FusionWeights) -> f32 {
    let lexical = scores.lexical.unwrap_or(0.0);
    let vector = scores.vector.unwrap_or(0.0);
    weights.lexical.mul_add(lexical, weights.vector * vector)
}

/// Candidates keyed by item id that remember first-seen order.
///
/// When the same item arrives several times on one path (one hit per content chunk) the
/// maximum score for that path is kept.
#[derive(Debug, Clone)]
pub struct CandidatePool<T> {
    entries: Vec<Scored<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for CandidatePool<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> CandidatePool<T>
where
    T: Identified + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, incoming: Vec<Scored<T>>) {
        for scored in incoming {
            let id = scored.item.get_id().to_owned();
            match self.index.get(&id).and_then(|&i| self.entries.get_mut(i)) {
                Some(existing) => {
                    existing.scores.lexical = max_option(existing.scores.lexical, scored.scores.lexical);
                    existing.scores.vector = max_option(existing.scores.vector, scored.scores.vector);
                }
                None => {
                    self.index.insert(id, self.entries.len());
                    self.entries.push(scored);
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Scored<T>> {
        self.index.get(id).and_then(|&i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apply_fusion(&mut self, weights: FusionWeights) {
        for entry in &mut self.entries {
            let fused = fuse_scores(&entry.scores, weights);
            entry.update_fused(fused);
        }
    }

    /// Candidates in first-seen order.
    pub fn into_vec(self) -> Vec<Scored<T>> {
        self.entries
    }
}

fn max_option(current: Option<f32>, incoming: Option<f32>) -> Option<f32> {
    match (current, incoming) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Stable sort by fused score, highest first; equal scores keep their incoming order.
pub fn sort_by_fused_desc<T>(items: &mut [Scored<T>]) {
    items.sort_by(|a, b| b.fused.partial_cmp(&a.fused).unwrap_or(Ordering::Equal));
}

/// Keeps the first occurrence of every item id. Returns how many entries were removed.
pub fn dedup_by_id<T>(items: &mut Vec<Scored<T>>) -> usize
where
    T: Identified,
{
    let before = items.len();
    let mut seen = HashSet::new();
    items.retain(|scored| seen.insert(scored.item.get_id().to_owned()));
    before.saturating_sub(items.len())
}
