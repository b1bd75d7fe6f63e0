pub mod analysis;
pub mod fusion;
pub mod keywords;
pub mod lexical;
pub mod pipeline;
pub mod scorer;
pub mod scoring;
pub mod vector;

use common::error::AppError;
use tracing::instrument;

pub use analysis::QueryAnalysis;
pub use fusion::{FusionEngine, RankOptions, RawCandidate, RetrievalPath, ScoredResult};
pub use keywords::KeywordTables;
pub use pipeline::{
    ranked_items_to_json, PipelineDiagnostics, PipelineStageTimings, QueryStyle,
    RetrievalConfig, RetrievalStrategy, RetrievalTuning, Retrievers,
};

/// Primary orchestrator for ranking catalog items related to a free-text query.
#[instrument(skip_all, fields(strategy = %config.strategy))]
pub async fn retrieve_products(
    engine: &FusionEngine,
    retrievers: Retrievers<'_>,
    input_text: &str,
    config: RetrievalConfig,
) -> Result<Vec<ScoredResult>, AppError> {
    pipeline::run_pipeline(engine, retrievers, input_text, config).await
}
