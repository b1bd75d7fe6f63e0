use async_trait::async_trait;
use common::{error::AppError, storage::types::catalog_item::CatalogItem};
use std::{future::Future, time::Duration};
use tracing::{debug, instrument, warn};

use crate::{
    analysis::{derive_boost_keywords, QueryAnalysis},
    fusion::{
        fuse_candidates, single_path_candidates, FusionEngine, RankOptions, RankReport,
        RawCandidate, RetrievalPath, ScoredResult,
    },
    lexical::{find_items_by_lexical_rank, LexicalRetriever},
    scoring::Scored,
    vector::{find_items_by_vector_similarity, VectorRetriever},
};

use super::{
    config::RetrievalConfig,
    diagnostics::{AssembleStats, CollectCandidatesStats, PipelineDiagnostics, ResultTrace},
    PipelineStage, PipelineStageTimings, StageKind,
};

const SCORE_SAMPLE_LEN: usize = 8;

/// Retrieval backends available to one pipeline run. A missing retriever is treated the same
/// as one that failed.
#[derive(Clone, Copy, Default)]
pub struct Retrievers<'a> {
    pub lexical: Option<&'a dyn LexicalRetriever>,
    pub vector: Option<&'a dyn VectorRetriever>,
}

impl<'a> Retrievers<'a> {
    pub fn new(lexical: &'a dyn LexicalRetriever, vector: &'a dyn VectorRetriever) -> Self {
        Self {
            lexical: Some(lexical),
            vector: Some(vector),
        }
    }

    pub fn lexical_only(lexical: &'a dyn LexicalRetriever) -> Self {
        Self {
            lexical: Some(lexical),
            vector: None,
        }
    }

    pub fn vector_only(vector: &'a dyn VectorRetriever) -> Self {
        Self {
            lexical: None,
            vector: Some(vector),
        }
    }
}

pub struct PipelineContext<'a> {
    pub engine: &'a FusionEngine,
    pub retrievers: Retrievers<'a>,
    pub input_text: String,
    pub config: RetrievalConfig,
    pub analysis: QueryAnalysis,
    pub boost_keywords: Vec<String>,
    pub lexical_candidates: Vec<RawCandidate>,
    pub vector_candidates: Vec<RawCandidate>,
    pub lexical_available: bool,
    pub vector_available: bool,
    pub merged: Vec<Scored<CatalogItem>>,
    pub rank_report: RankReport,
    pub diagnostics: Option<PipelineDiagnostics>,
    pub results: Vec<ScoredResult>,
    stage_timings: PipelineStageTimings,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        engine: &'a FusionEngine,
        retrievers: Retrievers<'a>,
        input_text: String,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            engine,
            retrievers,
            input_text,
            config,
            analysis: QueryAnalysis::default(),
            boost_keywords: Vec::new(),
            lexical_candidates: Vec::new(),
            vector_candidates: Vec::new(),
            lexical_available: false,
            vector_available: false,
            merged: Vec::new(),
            rank_report: RankReport::default(),
            diagnostics: None,
            results: Vec::new(),
            stage_timings: PipelineStageTimings::default(),
        }
    }

    pub fn rank_options(&self) -> RankOptions {
        self.config.rank_options(self.boost_keywords.clone())
    }

    pub fn enable_diagnostics(&mut self) {
        if self.diagnostics.is_none() {
            self.diagnostics = Some(PipelineDiagnostics::default());
        }
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.is_some()
    }

    pub fn record_analysis(&mut self) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.analysis = Some(self.analysis.clone());
            diag.boost_keywords = self.boost_keywords.clone();
        }
    }

    pub fn record_collect_candidates(&mut self, stats: CollectCandidatesStats) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.collect_candidates = Some(stats);
        }
    }

    pub fn record_rank(&mut self, report: RankReport) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.rank = Some(report);
        }
    }

    pub fn record_assemble(&mut self, stats: AssembleStats) {
        if let Some(diag) = self.diagnostics.as_mut() {
            diag.assemble = Some(stats);
        }
    }

    pub fn take_diagnostics(&mut self) -> Option<PipelineDiagnostics> {
        self.diagnostics.take()
    }

    pub fn take_stage_timings(&mut self) -> PipelineStageTimings {
        std::mem::take(&mut self.stage_timings)
    }

    pub fn record_stage_duration(&mut self, kind: StageKind, duration: Duration) {
        self.stage_timings.record(kind, duration);
    }

    pub fn take_results(&mut self) -> Vec<ScoredResult> {
        std::mem::take(&mut self.results)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzeQueryStage;

#[async_trait]
impl PipelineStage for AnalyzeQueryStage {
    fn kind(&self) -> StageKind {
        StageKind::AnalyzeQuery
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        analyze(ctx)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectCandidatesStage;

#[async_trait]
impl PipelineStage for CollectCandidatesStage {
    fn kind(&self) -> StageKind {
        StageKind::CollectCandidates
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        collect_candidates(ctx, true, true).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectVectorStage;

#[async_trait]
impl PipelineStage for CollectVectorStage {
    fn kind(&self) -> StageKind {
        StageKind::CollectCandidates
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        collect_candidates(ctx, false, true).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectLexicalStage;

#[async_trait]
impl PipelineStage for CollectLexicalStage {
    fn kind(&self) -> StageKind {
        StageKind::CollectCandidates
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        collect_candidates(ctx, true, false).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FuseStage;

#[async_trait]
impl PipelineStage for FuseStage {
    fn kind(&self) -> StageKind {
        StageKind::Fuse
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        fuse(ctx);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SinglePathStage;

#[async_trait]
impl PipelineStage for SinglePathStage {
    fn kind(&self) -> StageKind {
        StageKind::Fuse
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        single_path(ctx);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreStage;

#[async_trait]
impl PipelineStage for ScoreStage {
    fn kind(&self) -> StageKind {
        StageKind::Score
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        score(ctx);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AssembleStage;

#[async_trait]
impl PipelineStage for AssembleStage {
    fn kind(&self) -> StageKind {
        StageKind::Assemble
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        assemble(ctx);
        Ok(())
    }
}

/// Validates the request, then derives the query analysis and boost keywords.
#[instrument(level = "trace", skip_all)]
pub fn analyze(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    ctx.config.rank_options(Vec::new()).validate()?;

    ctx.analysis = ctx.engine.analyze(
        &ctx.input_text,
        ctx.config.tuning.enable_category_weighting,
    );
    ctx.boost_keywords = match &ctx.config.boost_keywords {
        Some(keywords) => keywords.clone(),
        None if ctx.config.style.derives_boost_keywords() => {
            derive_boost_keywords(&ctx.input_text, ctx.engine.tables())
        }
        None => Vec::new(),
    };

    debug!(
        targets = ?ctx.analysis.target_categories,
        attributes = ?ctx.analysis.attribute_mentions,
        product_type = ?ctx.analysis.type_mention,
        boost_keywords = ctx.boost_keywords.len(),
        "Query analysed"
    );
    ctx.record_analysis();
    Ok(())
}

#[instrument(level = "trace", skip_all)]
pub async fn collect_candidates(
    ctx: &mut PipelineContext<'_>,
    want_lexical: bool,
    want_vector: bool,
) -> Result<(), AppError> {
    debug!(want_lexical, want_vector, "Collecting candidates");
    let tuning = &ctx.config.tuning;
    let take = tuning.candidate_take();
    let timeout = tuning.retrieval_timeout();
    let source = tuning.catalog_source.as_str();
    let min_similarity = tuning.vector_min_similarity;
    let query = ctx.input_text.as_str();
    let lexical_retriever = ctx.retrievers.lexical.filter(|_| want_lexical);
    let vector_retriever = ctx.retrievers.vector.filter(|_| want_vector);

    let lexical_search = async {
        match lexical_retriever {
            Some(retriever) => Some(
                bounded(
                    RetrievalPath::Lexical,
                    timeout,
                    find_items_by_lexical_rank(retriever, query, take, source),
                )
                .await,
            ),
            None => None,
        }
    };
    let vector_search = async {
        match vector_retriever {
            Some(retriever) => Some(
                bounded(
                    RetrievalPath::Vector,
                    timeout,
                    find_items_by_vector_similarity(retriever, query, take, min_similarity, source),
                )
                .await,
            ),
            None => None,
        }
    };

    let (lexical_outcome, vector_outcome) = tokio::join!(lexical_search, vector_search);

    let lexical = settle(RetrievalPath::Lexical, want_lexical, lexical_outcome);
    let vector = settle(RetrievalPath::Vector, want_vector, vector_outcome);

    ctx.lexical_available = lexical.is_some();
    ctx.vector_available = vector.is_some();
    ctx.lexical_candidates = lexical.unwrap_or_default();
    ctx.vector_candidates = vector.unwrap_or_default();

    debug!(
        lexical_candidates = ctx.lexical_candidates.len(),
        vector_candidates = ctx.vector_candidates.len(),
        lexical_available = ctx.lexical_available,
        vector_available = ctx.vector_available,
        "Candidate collection finished"
    );

    if ctx.diagnostics_enabled() {
        ctx.record_collect_candidates(CollectCandidatesStats {
            lexical_available: ctx.lexical_available,
            vector_available: ctx.vector_available,
            lexical_candidates: ctx.lexical_candidates.len(),
            vector_candidates: ctx.vector_candidates.len(),
            lexical_scores: sample_scores(&ctx.lexical_candidates),
            vector_scores: sample_scores(&ctx.vector_candidates),
        });
    }

    Ok(())
}

/// Weighted fusion of both paths. A path that was unavailable simply contributes nothing.
#[instrument(level = "trace", skip_all)]
pub fn fuse(ctx: &mut PipelineContext<'_>) {
    if !ctx.lexical_available && !ctx.vector_available {
        debug!("No retrieval path available; nothing to fuse");
    }
    let weights = ctx.config.fusion_weights();
    let lexical = std::mem::take(&mut ctx.lexical_candidates);
    let vector = std::mem::take(&mut ctx.vector_candidates);
    let mut report = RankReport::default();
    ctx.merged = fuse_candidates(lexical, vector, weights, &mut report);
    ctx.rank_report = report;
    debug!(
        merged = ctx.merged.len(),
        lexical_weight = weights.lexical,
        vector_weight = weights.vector,
        "Fused candidates"
    );
}

#[instrument(level = "trace", skip_all)]
pub fn single_path(ctx: &mut PipelineContext<'_>) {
    let mut candidates = std::mem::take(&mut ctx.lexical_candidates);
    candidates.append(&mut ctx.vector_candidates);
    let mut report = RankReport::default();
    ctx.merged = single_path_candidates(candidates, &mut report);
    ctx.rank_report = report;
    debug!(merged = ctx.merged.len(), "Prepared single-path candidates");
}

#[instrument(level = "trace", skip_all)]
pub fn score(ctx: &mut PipelineContext<'_>) {
    let options = ctx.rank_options();
    let merged = std::mem::take(&mut ctx.merged);
    let outcome = ctx
        .engine
        .select(&ctx.analysis, merged, &options, ctx.rank_report);
    ctx.rank_report = outcome.report;
    ctx.results = outcome.results;
    ctx.record_rank(outcome.report);
}

#[instrument(level = "trace", skip_all)]
pub fn assemble(ctx: &mut PipelineContext<'_>) {
    debug!(results = ctx.results.len(), "Assembling ranked results");
    if ctx.diagnostics_enabled() {
        let traces = ctx
            .results
            .iter()
            .map(|result| ResultTrace {
                item_id: result.item.id.clone(),
                lexical_component: result.lexical_component,
                vector_component: result.vector_component,
                breakdown: result.breakdown,
            })
            .collect();
        ctx.record_assemble(AssembleStats {
            result_count: ctx.results.len(),
            traces,
        });
    }
}

async fn bounded<F>(
    path: RetrievalPath,
    timeout: Option<Duration>,
    search: F,
) -> Result<Vec<RawCandidate>, AppError>
where
    F: Future<Output = Result<Vec<RawCandidate>, AppError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, search).await.map_err(|_| {
            AppError::RetrievalUnavailable(format!(
                "{path} retrieval timed out after {}ms",
                limit.as_millis()
            ))
        })?,
        None => search.await,
    }
}

/// Maps a retrieval outcome to candidates, or `None` when the path is unavailable.
fn settle(
    path: RetrievalPath,
    wanted: bool,
    outcome: Option<Result<Vec<RawCandidate>, AppError>>,
) -> Option<Vec<RawCandidate>> {
    match outcome {
        Some(Ok(candidates)) => Some(candidates),
        Some(Err(err)) => {
            warn!(%path, error = %err, "Retrieval path unavailable; degrading");
            None
        }
        None => {
            if wanted {
                debug!(%path, "No retriever configured for path");
            }
            None
        }
    }
}

fn sample_scores(candidates: &[RawCandidate]) -> Vec<f32> {
    candidates
        .iter()
        .take(SCORE_SAMPLE_LEN)
        .map(|candidate| candidate.base_score)
        .collect()
}
