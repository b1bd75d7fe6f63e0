use std::{collections::HashSet, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use common::storage::catalog::CatalogStore;
use retrieval_pipeline::{
    pipeline::run_pipeline_with_diagnostics, FusionEngine, RetrievalConfig, Retrievers,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{args::Config, cases::EvalCase, replay::ReplayRetrievers};

/// Result of replaying one case at one threshold.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub case_id: String,
    pub query: String,
    pub retrieved: Vec<String>,
    pub scores: Vec<f32>,
    pub expected: Vec<String>,
    pub true_positives: usize,
    pub noise: usize,
    pub lexical_available: bool,
    pub vector_available: bool,
    pub latency_ms: u128,
}

impl CaseOutcome {
    fn new(case_id: String, case: &EvalCase, ranked: Vec<(String, f32)>) -> Self {
        let expected: HashSet<&str> = case.expected.iter().map(String::as_str).collect();
        let true_positives = ranked
            .iter()
            .filter(|(id, _)| expected.contains(id.as_str()))
            .count();
        let noise = ranked.len().saturating_sub(true_positives);
        let (retrieved, scores) = ranked.into_iter().unzip();
        Self {
            case_id,
            query: case.query.clone(),
            retrieved,
            scores,
            expected: case.expected.clone(),
            true_positives,
            noise,
            lexical_available: true,
            vector_available: true,
            latency_ms: 0,
        }
    }
}

/// Micro-averaged metrics over every case at one threshold.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdSummary {
    pub threshold: f32,
    pub cases: usize,
    pub retrieved: usize,
    pub expected: usize,
    pub true_positives: usize,
    pub precision: f64,
    pub recall: f64,
    /// Share of returned results that were not expected.
    pub noise_rate: f64,
    pub empty_results: usize,
    pub degraded_cases: usize,
    pub outcomes: Vec<CaseOutcome>,
}

pub fn summarize(threshold: f32, outcomes: Vec<CaseOutcome>) -> ThresholdSummary {
    let retrieved: usize = outcomes.iter().map(|o| o.retrieved.len()).sum();
    let expected: usize = outcomes.iter().map(|o| o.expected.len()).sum();
    let true_positives: usize = outcomes.iter().map(|o| o.true_positives).sum();
    let noise: usize = outcomes.iter().map(|o| o.noise).sum();
    let empty_results = outcomes.iter().filter(|o| o.retrieved.is_empty()).count();
    let degraded_cases = outcomes
        .iter()
        .filter(|o| !o.lexical_available || !o.vector_available)
        .count();

    ThresholdSummary {
        threshold,
        cases: outcomes.len(),
        retrieved,
        expected,
        true_positives,
        precision: ratio(true_positives, retrieved),
        recall: ratio(true_positives, expected),
        noise_rate: ratio(noise, retrieved),
        empty_results,
        degraded_cases,
        outcomes,
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Replays every case through the pipeline with the given threshold.
pub async fn evaluate_threshold(
    engine: &FusionEngine,
    catalog: &CatalogStore,
    cases: &[EvalCase],
    base: &RetrievalConfig,
    config: &Config,
    threshold: f32,
) -> Result<ThresholdSummary> {
    let mut outcomes = Vec::with_capacity(cases.len());

    for (index, case) in cases.iter().enumerate() {
        let case_id = case.label(index);
        let replay = ReplayRetrievers::from_case(case, catalog);
        debug!(
            case_id = %case_id,
            lexical = replay.lexical_len(),
            vector = replay.vector_len(),
            "Replaying case"
        );

        let mut run_config = base.clone().style(case.style.unwrap_or(config.style));
        run_config.tuning.score_threshold = threshold;
        if let Some(keywords) = case.boost_keywords.clone() {
            run_config = run_config.boost_keywords(keywords);
        }

        let started = Instant::now();
        let run = run_pipeline_with_diagnostics(
            engine,
            Retrievers::new(&replay, &replay),
            &case.query,
            run_config,
        )
        .await
        .with_context(|| format!("running case {case_id}"))?;
        let latency_ms = started.elapsed().as_millis();

        let ranked = run
            .results
            .iter()
            .map(|result| (result.item.id.clone(), result.score))
            .collect();
        let mut outcome = CaseOutcome::new(case_id, case, ranked);
        outcome.latency_ms = latency_ms;
        if let Some(collect) = run.diagnostics.and_then(|d| d.collect_candidates) {
            outcome.lexical_available = collect.lexical_available;
            outcome.vector_available = collect.vector_available;
        }
        outcomes.push(outcome);
    }

    let summary = summarize(threshold, outcomes);
    info!(
        threshold,
        cases = summary.cases,
        precision = summary.precision,
        recall = summary.recall,
        noise_rate = summary.noise_rate,
        "Threshold evaluated"
    );
    Ok(summary)
}

/// Builds the shared retrieval config from CLI flags.
pub fn base_config(config: &Config, app: &common::utils::config::AppConfig) -> RetrievalConfig {
    let mut tuning = retrieval_pipeline::RetrievalTuning::from_app_config(app);
    tuning.result_limit = config.limit;
    if config.no_category_weighting {
        tuning.enable_category_weighting = false;
    }
    RetrievalConfig::with_tuning(config.strategy, tuning)
}

pub fn build_engine(
    tables: Arc<retrieval_pipeline::KeywordTables>,
    tuning: &retrieval_pipeline::RetrievalTuning,
) -> FusionEngine {
    FusionEngine::new(tables, tuning.scoring)
}
