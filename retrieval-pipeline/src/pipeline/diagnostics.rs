use serde::Serialize;

use crate::{analysis::QueryAnalysis, fusion::RankReport, scorer::ScoreBreakdown};

/// Captures instrumentation for each retrieval stage when diagnostics are enabled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineDiagnostics {
    pub analysis: Option<QueryAnalysis>,
    pub boost_keywords: Vec<String>,
    pub collect_candidates: Option<CollectCandidatesStats>,
    pub rank: Option<RankReport>,
    pub assemble: Option<AssembleStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectCandidatesStats {
    pub lexical_available: bool,
    pub vector_available: bool,
    pub lexical_candidates: usize,
    pub vector_candidates: usize,
    pub lexical_scores: Vec<f32>,
    pub vector_scores: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembleStats {
    pub result_count: usize,
    pub traces: Vec<ResultTrace>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultTrace {
    pub item_id: String,
    pub lexical_component: f32,
    pub vector_component: f32,
    pub breakdown: ScoreBreakdown,
}
