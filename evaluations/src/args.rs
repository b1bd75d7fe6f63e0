use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use retrieval_pipeline::{QueryStyle, RetrievalStrategy};

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf()
}

fn default_report_dir() -> PathBuf {
    workspace_root().join("evaluations/reports")
}

/// Replays recorded retrieval cases through the ranking engine at one or more thresholds.
#[derive(Parser, Debug, Clone)]
#[command(name = "evaluations", version, about)]
pub struct Config {
    /// Catalog JSON file (array of catalog records)
    #[arg(long, env = "EVAL_CATALOG")]
    pub catalog: PathBuf,

    /// YAML file with recorded retrieval cases
    #[arg(long, env = "EVAL_CASES")]
    pub cases: PathBuf,

    /// Score thresholds to compare, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = vec![0.2_f32, 0.5_f32])]
    pub thresholds: Vec<f32>,

    /// Retrieval strategy used for every case
    #[arg(long, default_value_t = RetrievalStrategy::Hybrid)]
    pub strategy: RetrievalStrategy,

    /// Query style used for cases that do not set their own
    #[arg(long, default_value_t = QueryStyle::KeywordBoosted)]
    pub style: QueryStyle,

    /// Maximum results per query
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Disable category inference and weighting
    #[arg(long = "no-category-weighting", action = clap::ArgAction::SetTrue, default_value_t = false)]
    pub no_category_weighting: bool,

    /// Optional application config file (keyword tables path, weights)
    #[arg(long)]
    pub app_config: Option<String>,

    /// Directory for JSON reports
    #[arg(long, default_value_os_t = default_report_dir())]
    pub report_dir: PathBuf,

    /// Skip writing the JSON report
    #[arg(long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    pub no_report: bool,
}

impl Config {
    pub fn finalize(&mut self) -> Result<()> {
        if self.thresholds.is_empty() {
            return Err(anyhow!("at least one --thresholds value is required"));
        }
        if let Some(bad) = self
            .thresholds
            .iter()
            .find(|t| !t.is_finite() || !(0.0..=1.0).contains(*t))
        {
            return Err(anyhow!("threshold {bad} is outside [0, 1]"));
        }
        if self.limit == 0 {
            return Err(anyhow!("--limit must be at least 1"));
        }
        self.thresholds.sort_by(f32::total_cmp);
        self.thresholds.dedup();
        Ok(())
    }
}

pub struct ParsedArgs {
    pub config: Config,
}

pub fn parse() -> Result<ParsedArgs> {
    let mut config = Config::parse();
    config.finalize()?;
    Ok(ParsedArgs { config })
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}
