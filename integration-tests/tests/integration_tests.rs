use common::{
    error::AppError,
    storage::types::catalog_item::CatalogItem,
    utils::config::{get_config_from_path, AppConfig},
};
use retrieval_pipeline::{
    pipeline::run_pipeline_with_diagnostics, ranked_items_to_json, retrieve_products,
    scoring::FusionWeights, FusionEngine, KeywordTables, QueryStyle, RankOptions, RawCandidate,
    RetrievalConfig, RetrievalStrategy, RetrievalTuning, Retrievers,
};
use std::{collections::HashSet, io::Write, sync::Arc, time::Duration};

use test_utils::*;

// End-to-end checks of the ranking engine and the staged retrieval pipeline, driven by
// in-memory retrievers.

fn no_threshold() -> RankOptions {
    RankOptions {
        score_threshold: 0.0,
        ..RankOptions::default()
    }
}

#[test]
fn test_matching_speaker_saturates_score() {
    let engine = default_engine();

    let outcome = engine
        .rank_with_report(
            "waterproof bluetooth speaker",
            vec![RawCandidate::lexical(waterproof_speaker(), 0.9)],
            vec![RawCandidate::vector(waterproof_speaker(), 0.85)],
            &RankOptions::default(),
        )
        .expect("ranking should succeed");

    assert_eq!(outcome.results.len(), 1);
    let top = &outcome.results[0];
    assert_eq!(top.item.id, "X-100");
    assert!((top.fused_base - 0.87).abs() < 1e-5);
    assert!((top.score - 1.0).abs() < f32::EPSILON);
    assert_eq!(top.breakdown.category_weight, Some(2.0));
    assert!((top.breakdown.attribute_score - 1.0).abs() < f32::EPSILON);
    assert!((top.breakdown.type_factor - 1.5).abs() < f32::EPSILON);
}

#[test]
fn test_unrelated_item_is_dropped_regardless_of_base() {
    let engine = default_engine();

    let outcome = engine
        .rank_with_report(
            "waterproof bluetooth speaker",
            vec![
                RawCandidate::lexical(desk_lamp(), 0.99),
                RawCandidate::lexical(waterproof_speaker(), 0.9),
            ],
            vec![RawCandidate::vector(desk_lamp(), 0.99)],
            &no_threshold(),
        )
        .expect("ranking should succeed");

    let ids: Vec<_> = outcome.results.iter().map(|r| r.item.id.as_str()).collect();
    assert_eq!(ids, vec!["X-100"]);
    assert_eq!(outcome.report.category_mismatch, 1);
}

#[test]
fn test_threshold_removes_weak_results() {
    let engine = default_engine();
    let strong = CatalogItem::new("G-1", "gift card", "");
    let weak = CatalogItem::new("G-2", "gift wrap", "");

    let outcome = engine
        .rank_single_path(
            "",
            vec![
                RawCandidate::vector(strong, 0.93),
                RawCandidate::vector(weak, 0.44),
            ],
            &RankOptions::default(),
        )
        .expect("ranking should succeed");

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].item.id, "G-1");
    assert!((outcome.results[0].score - 0.93).abs() < 1e-6);
    assert_eq!(outcome.report.below_threshold, 1);
}

#[test]
fn test_vector_only_item_is_not_penalised_for_missing_path() {
    let engine = default_engine();
    let options = RankOptions {
        weights: FusionWeights::natural_language(),
        ..RankOptions::default()
    };

    let results = engine
        .rank(
            "speaker",
            vec![],
            vec![RawCandidate::vector(waterproof_speaker(), 0.8)],
            &options,
        )
        .expect("ranking should succeed");

    assert_eq!(results.len(), 1);
    assert!((results[0].fused_base - 0.52).abs() < 1e-6);
    assert!(results[0].lexical_component.abs() < f32::EPSILON);
    assert!(results[0].score >= options.score_threshold);
}

#[test]
fn test_disabling_category_weighting_keeps_off_category_items() {
    let engine = default_engine();
    let options = RankOptions {
        enable_category_weighting: false,
        ..no_threshold()
    };

    let results = engine
        .rank(
            "waterproof speaker",
            vec![],
            vec![
                RawCandidate::vector(waterproof_speaker(), 0.9),
                RawCandidate::vector(desk_lamp(), 0.9),
            ],
            &options,
        )
        .expect("ranking should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].item.id, "X-100");
    assert!(results[1].breakdown.category_weight.is_none());
}

#[test]
fn test_invalid_options_are_rejected() {
    let engine = default_engine();
    let bad_weights = RankOptions {
        weights: FusionWeights {
            lexical: -1.0,
            vector: 0.5,
        },
        ..RankOptions::default()
    };
    let bad_threshold = RankOptions {
        score_threshold: 1.5,
        ..RankOptions::default()
    };

    for options in [bad_weights, bad_threshold] {
        let result = engine.rank("speaker", vec![], vec![], &options);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

#[tokio::test]
async fn test_hybrid_pipeline_output_properties() {
    let engine = default_engine();
    let catalog = sample_catalog();
    let vector = FakeVector::new(vec![
        (waterproof_speaker(), 0.85),
        (earbuds(), 0.6),
        (desk_lamp(), 0.5),
        (projector(), 0.3),
        (waterproof_speaker(), 0.4),
    ]);
    let config = RetrievalConfig::default();
    let threshold = config.tuning.score_threshold;

    let results = retrieve_products(
        &engine,
        Retrievers::new(&catalog, &vector),
        "speaker",
        config,
    )
    .await
    .expect("pipeline should succeed");

    let ids: Vec<_> = results.iter().map(|r| r.item.id.as_str()).collect();
    assert!(ids.contains(&"X-100"));
    assert!(ids.contains(&"S-2"));
    assert!(!ids.contains(&"Y-200"));
    assert!(!ids.contains(&"P-1"));
    assert!(!ids.contains(&"R-1"), "records from other sources are filtered");

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    assert!(results
        .iter()
        .all(|r| (0.0..=1.0).contains(&r.score) && r.score >= threshold));
    assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn test_result_limit_is_respected() {
    let engine = default_engine();
    let items: Vec<CatalogItem> = (0..8)
        .map(|i| CatalogItem::new(format!("S-{i}"), format!("S-{i} speaker"), "audio equipment"))
        .collect();
    let lexical = FakeLexical::new(items.clone());
    let vector = FakeVector::new(items.into_iter().map(|item| (item, 0.9)).collect());
    let mut config = RetrievalConfig::default();
    config.tuning.result_limit = 3;

    let results = retrieve_products(
        &engine,
        Retrievers::new(&lexical, &vector),
        "speaker",
        config,
    )
    .await
    .expect("pipeline should succeed");

    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_pipeline_degrades_when_lexical_path_fails() {
    let engine = default_engine();
    let vector = FakeVector::new(vec![(waterproof_speaker(), 0.8)]);
    let config = RetrievalConfig::default().style(QueryStyle::NaturalLanguage);

    let run = run_pipeline_with_diagnostics(
        &engine,
        Retrievers::new(&Offline, &vector),
        "a speaker for the beach",
        config,
    )
    .await
    .expect("degraded pipeline should succeed");

    let collect = run
        .diagnostics
        .and_then(|d| d.collect_candidates)
        .expect("collect stats");
    assert!(!collect.lexical_available);
    assert!(collect.vector_available);
    assert_eq!(run.results.len(), 1);
    assert!((run.results[0].fused_base - 0.52).abs() < 1e-6);
}

#[tokio::test]
async fn test_pipeline_returns_empty_when_both_paths_fail() {
    let engine = default_engine();

    let results = retrieve_products(
        &engine,
        Retrievers::new(&Offline, &Offline),
        "speaker",
        RetrievalConfig::default(),
    )
    .await
    .expect("pipeline should not fail");

    assert!(results.is_empty());
}

#[tokio::test]
async fn test_slow_vector_path_times_out() {
    let engine = default_engine();
    let lexical = FakeLexical::new(vec![waterproof_speaker()]);
    let vector = SlowVector {
        delay: Duration::from_secs(2),
        inner: FakeVector::new(vec![(earbuds(), 0.95)]),
    };
    let mut config = RetrievalConfig::default();
    config.tuning.retrieval_timeout_ms = Some(50);

    let run = run_pipeline_with_diagnostics(
        &engine,
        Retrievers::new(&lexical, &vector),
        "speaker",
        config,
    )
    .await
    .expect("pipeline should not fail");

    let collect = run
        .diagnostics
        .and_then(|d| d.collect_candidates)
        .expect("collect stats");
    assert!(!collect.vector_available);
    let ids: Vec<_> = run.results.iter().map(|r| r.item.id.as_str()).collect();
    assert_eq!(ids, vec!["X-100"]);
}

#[tokio::test]
async fn test_semantic_strategy_ignores_failing_lexical_retriever() {
    let engine = default_engine();
    let vector = FakeVector::new(vec![(waterproof_speaker(), 0.7)]);

    let results = retrieve_products(
        &engine,
        Retrievers::new(&Offline, &vector),
        "speaker",
        RetrievalConfig::with_strategy(RetrievalStrategy::Semantic),
    )
    .await
    .expect("semantic pipeline should succeed");

    assert_eq!(results.len(), 1);
    assert!((results[0].fused_base - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_concurrent_queries_share_one_engine() {
    let engine = default_engine();
    let catalog = sample_catalog();
    let vector = FakeVector::new(vec![(waterproof_speaker(), 0.85), (projector(), 0.9)]);

    let (speakers, projectors, speakers_again) = tokio::join!(
        retrieve_products(
            &engine,
            Retrievers::new(&catalog, &vector),
            "speaker",
            RetrievalConfig::default(),
        ),
        retrieve_products(
            &engine,
            Retrievers::vector_only(&vector),
            "projector",
            RetrievalConfig::default(),
        ),
        retrieve_products(
            &engine,
            Retrievers::new(&catalog, &vector),
            "speaker",
            RetrievalConfig::default(),
        ),
    );

    let speakers = speakers.expect("speaker query");
    let speakers_again = speakers_again.expect("repeated speaker query");
    let projectors = projectors.expect("projector query");

    let ids = |results: &[retrieval_pipeline::ScoredResult]| {
        results
            .iter()
            .map(|r| r.item.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&speakers), ids(&speakers_again));
    assert_eq!(ids(&projectors), vec!["P-1".to_string()]);
}

#[test]
fn test_ranked_items_render_as_json() {
    let engine = default_engine();
    let results = engine
        .rank(
            "waterproof bluetooth speaker",
            vec![RawCandidate::lexical(waterproof_speaker(), 0.9)],
            vec![RawCandidate::vector(waterproof_speaker(), 0.85)],
            &RankOptions::default(),
        )
        .expect("ranking should succeed");

    let value = ranked_items_to_json(&results);
    assert_eq!(value[0]["item_id"], "X-100");
    assert_eq!(value[0]["product_name"], "X-100 speaker");
    assert_eq!(value[0]["similarity_score"], serde_json::json!(1.0));
    assert_eq!(value[0]["features"][0], "waterproof");
}

#[test]
fn test_file_config_drives_tuning_and_tables() -> anyhow::Result<()> {
    let mut tables_file = tempfile::Builder::new().suffix(".json").tempfile()?;
    write!(
        tables_file,
        r#"{{
            "categories": [{{"name": "lighting", "keywords": ["lamp"]}}],
            "product_types": [{{"name": "lamp", "keywords": ["lamp"]}}]
        }}"#
    )?;
    let tables_path = tables_file
        .path()
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("non-utf8 temp path"))?;

    let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(config_file, "keyword_tables_path = \"{tables_path}\"")?;
    writeln!(config_file, "score_threshold = 0.9")?;
    writeln!(config_file, "result_limit = 1")?;
    writeln!(config_file, "lexical_weight = 0.5")?;
    writeln!(config_file, "vector_weight = 0.5")?;
    let config_path = config_file
        .path()
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("non-utf8 temp path"))?;

    let app: AppConfig = get_config_from_path(config_path)?;
    let tuning = RetrievalTuning::from_app_config(&app);
    assert_eq!(tuning.result_limit, 1);
    assert_eq!(tuning.lexical_weight, Some(0.5));
    assert_eq!(tuning.vector_weight, Some(0.5));

    let tables = KeywordTables::load(&app)?;
    assert_eq!(tables.categories.len(), 1);
    let engine = FusionEngine::new(Arc::clone(&tables), tuning.scoring);
    let options = RetrievalConfig::new(tuning).rank_options(Vec::new());

    let results = engine.rank(
        "desk lamp",
        vec![],
        vec![
            RawCandidate::vector(waterproof_speaker(), 0.9),
            RawCandidate::vector(desk_lamp(), 0.6),
        ],
        &options,
    )?;

    let ids: Vec<_> = results.iter().map(|r| r.item.id.as_str()).collect();
    assert_eq!(ids, vec!["Y-200"]);
    Ok(())
}
