mod args;
mod cases;
mod eval;
mod replay;
mod report;

use anyhow::Context;
use chrono::Utc;
use common::{
    storage::catalog::CatalogStore,
    utils::config::{get_config_from_path, AppConfig},
};
use retrieval_pipeline::KeywordTables;
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(std::thread::available_parallelism()?.get())
        .thread_name("eval-ranking-worker")
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let parsed = args::parse()?;
    let config = parsed.config;

    let app_config = match config.app_config.as_deref() {
        Some(path) => get_config_from_path(path)
            .with_context(|| format!("loading application config from {path}"))?,
        None => AppConfig::default(),
    };

    let tables = KeywordTables::load(&app_config).context("loading keyword tables")?;
    let catalog = CatalogStore::load_from_path(&config.catalog)
        .await
        .with_context(|| format!("loading catalog from {}", config.catalog.display()))?;
    let cases = cases::load_cases(&config.cases)?;
    info!(
        cases = cases.len(),
        catalog_items = catalog.len(),
        strategy = %config.strategy,
        thresholds = ?config.thresholds,
        "Starting evaluation run"
    );

    let base = eval::base_config(&config, &app_config);
    let engine = eval::build_engine(tables, &base.tuning);

    let mut summaries = Vec::with_capacity(config.thresholds.len());
    for &threshold in &config.thresholds {
        let summary =
            eval::evaluate_threshold(&engine, &catalog, &cases, &base, &config, threshold).await?;
        summaries.push(summary);
    }

    let report = report::EvaluationReport {
        generated_at: Utc::now(),
        strategy: config.strategy.to_string(),
        style: config.style.to_string(),
        limit: config.limit,
        category_weighting: base.tuning.enable_category_weighting,
        catalog_items: catalog.len(),
        thresholds: summaries,
    };

    for line in report.summary_lines() {
        println!("{line}");
    }

    if !config.no_report {
        let path = report.write_json(&config.report_dir)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
