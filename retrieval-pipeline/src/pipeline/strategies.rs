use super::{
    stages::{
        AnalyzeQueryStage, AssembleStage, CollectCandidatesStage, CollectLexicalStage,
        CollectVectorStage, FuseStage, PipelineContext, ScoreStage, SinglePathStage,
    },
    BoxedStage, StrategyDriver,
};
use crate::fusion::ScoredResult;
use common::error::AppError;

/// Runs both retrievers concurrently and fuses their scores.
pub struct HybridStrategyDriver;

impl HybridStrategyDriver {
    pub fn new() -> Self {
        Self
    }
}

impl StrategyDriver for HybridStrategyDriver {
    type Output = Vec<ScoredResult>;

    fn stages(&self) -> Vec<BoxedStage> {
        vec![
            Box::new(AnalyzeQueryStage),
            Box::new(CollectCandidatesStage),
            Box::new(FuseStage),
            Box::new(ScoreStage),
            Box::new(AssembleStage),
        ]
    }

    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError> {
        Ok(ctx.take_results())
    }
}

pub struct SemanticStrategyDriver;

impl SemanticStrategyDriver {
    pub fn new() -> Self {
        Self
    }
}

impl StrategyDriver for SemanticStrategyDriver {
    type Output = Vec<ScoredResult>;

    fn stages(&self) -> Vec<BoxedStage> {
        vec![
            Box::new(AnalyzeQueryStage),
            Box::new(CollectVectorStage),
            Box::new(SinglePathStage),
            Box::new(ScoreStage),
            Box::new(AssembleStage),
        ]
    }

    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError> {
        Ok(ctx.take_results())
    }
}

pub struct LexicalStrategyDriver;

impl LexicalStrategyDriver {
    pub fn new() -> Self {
        Self
    }
}

impl StrategyDriver for LexicalStrategyDriver {
    type Output = Vec<ScoredResult>;

    fn stages(&self) -> Vec<BoxedStage> {
        vec![
            Box::new(AnalyzeQueryStage),
            Box::new(CollectLexicalStage),
            Box::new(SinglePathStage),
            Box::new(ScoreStage),
            Box::new(AssembleStage),
        ]
    }

    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError> {
        Ok(ctx.take_results())
    }
}
