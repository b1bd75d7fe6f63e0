mod config;
mod diagnostics;
mod stages;
mod strategies;

pub use config::{QueryStyle, RetrievalConfig, RetrievalStrategy, RetrievalTuning};
pub use diagnostics::{AssembleStats, CollectCandidatesStats, PipelineDiagnostics, ResultTrace};
pub use stages::Retrievers;

use crate::fusion::{FusionEngine, ScoredResult};
use async_trait::async_trait;
use common::error::AppError;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

use stages::PipelineContext;
use strategies::{HybridStrategyDriver, LexicalStrategyDriver, SemanticStrategyDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    AnalyzeQuery,
    CollectCandidates,
    Fuse,
    Score,
    Assemble,
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn kind(&self) -> StageKind;
    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError>;
}

pub type BoxedStage = Box<dyn PipelineStage>;

#[async_trait]
pub trait StrategyDriver: Send + Sync {
    type Output;

    fn stages(&self) -> Vec<BoxedStage>;
    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError>;
}

#[derive(Debug, Default, Clone)]
pub struct PipelineStageTimings {
    timings: Vec<(StageKind, Duration)>,
}

impl PipelineStageTimings {
    pub fn record(&mut self, kind: StageKind, duration: Duration) {
        self.timings.push((kind, duration));
    }

    pub fn into_vec(self) -> Vec<(StageKind, Duration)> {
        self.timings
    }

    fn get_stage_ms(&self, kind: StageKind) -> u128 {
        self.timings
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, d)| d.as_millis())
    }

    pub fn collect_candidates_ms(&self) -> u128 {
        self.get_stage_ms(StageKind::CollectCandidates)
    }

    pub fn score_ms(&self) -> u128 {
        self.get_stage_ms(StageKind::Score)
    }

    pub fn total_ms(&self) -> u128 {
        self.timings.iter().map(|(_, d)| d.as_millis()).sum()
    }
}

pub struct PipelineRunOutput<T> {
    pub results: T,
    pub diagnostics: Option<PipelineDiagnostics>,
    pub stage_timings: PipelineStageTimings,
}

pub async fn run_pipeline(
    engine: &FusionEngine,
    retrievers: Retrievers<'_>,
    input_text: &str,
    config: RetrievalConfig,
) -> Result<Vec<ScoredResult>, AppError> {
    execute(engine, retrievers, input_text, config, false)
        .await
        .map(|run| run.results)
}

pub async fn run_pipeline_with_diagnostics(
    engine: &FusionEngine,
    retrievers: Retrievers<'_>,
    input_text: &str,
    config: RetrievalConfig,
) -> Result<PipelineRunOutput<Vec<ScoredResult>>, AppError> {
    execute(engine, retrievers, input_text, config, true).await
}

/// Renders ranked items for downstream prompt templates.
pub fn ranked_items_to_json(results: &[ScoredResult]) -> serde_json::Value {
    serde_json::json!(results
        .iter()
        .map(|entry| {
            serde_json::json!({
                "item_id": entry.item.id,
                "product_name": entry.item.name,
                "category": entry.item.category,
                "price": entry.item.price,
                "features": entry.item.features,
                "similarity_score": round_score(entry.score),
                "lexical_component": round_score(entry.lexical_component),
                "vector_component": round_score(entry.vector_component),
            })
        })
        .collect::<Vec<_>>())
}

#[instrument(skip_all, fields(strategy = %config.strategy, style = %config.style))]
async fn execute(
    engine: &FusionEngine,
    retrievers: Retrievers<'_>,
    input_text: &str,
    config: RetrievalConfig,
    capture_diagnostics: bool,
) -> Result<PipelineRunOutput<Vec<ScoredResult>>, AppError> {
    let input_chars = input_text.chars().count();
    let input_preview: String = input_text.chars().take(120).collect();
    let input_preview_clean = input_preview.replace('\n', " ");
    let preview_len = input_preview_clean.chars().count();
    info!(
        input_chars,
        preview_truncated = input_chars > preview_len,
        preview = %input_preview_clean,
        strategy = %config.strategy,
        "Starting retrieval pipeline"
    );

    let strategy = config.strategy;
    let ctx = PipelineContext::new(engine, retrievers, input_text.to_owned(), config);
    match strategy {
        RetrievalStrategy::Hybrid => {
            run_with_driver(HybridStrategyDriver::new(), ctx, capture_diagnostics).await
        }
        RetrievalStrategy::Semantic => {
            run_with_driver(SemanticStrategyDriver::new(), ctx, capture_diagnostics).await
        }
        RetrievalStrategy::Lexical => {
            run_with_driver(LexicalStrategyDriver::new(), ctx, capture_diagnostics).await
        }
    }
}

async fn run_with_driver<D: StrategyDriver>(
    driver: D,
    mut ctx: PipelineContext<'_>,
    capture_diagnostics: bool,
) -> Result<PipelineRunOutput<D::Output>, AppError> {
    if capture_diagnostics {
        ctx.enable_diagnostics();
    }

    for stage in driver.stages() {
        let start = Instant::now();
        stage.execute(&mut ctx).await?;
        ctx.record_stage_duration(stage.kind(), start.elapsed());
    }

    let diagnostics = ctx.take_diagnostics();
    let stage_timings = ctx.take_stage_timings();
    let results = driver.finalize(&mut ctx)?;

    Ok(PipelineRunOutput {
        results,
        diagnostics,
        stage_timings,
    })
}

fn round_score(value: f32) -> f64 {
    (f64::from(value) * 10_000.0).round() / 10_000.0
}
