use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{args::ensure_parent, eval::ThresholdSummary};

#[derive(Debug, Serialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub strategy: String,
    pub style: String,
    pub limit: usize,
    pub category_weighting: bool,
    pub catalog_items: usize,
    pub thresholds: Vec<ThresholdSummary>,
}

impl EvaluationReport {
    /// One line per threshold, suitable for terminal output.
    pub fn summary_lines(&self) -> Vec<String> {
        self.thresholds
            .iter()
            .map(|summary| {
                format!(
                    "threshold {:.2}: cases {} | precision {:.3} | recall {:.3} | noise {:.3} | empty {} | degraded {}",
                    summary.threshold,
                    summary.cases,
                    summary.precision,
                    summary.recall,
                    summary.noise_rate,
                    summary.empty_results,
                    summary.degraded_cases,
                )
            })
            .collect()
    }

    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        let file_name = format!(
            "evaluation-{}-{}.json",
            self.strategy,
            self.generated_at.format("%Y%m%dT%H%M%SZ")
        );
        let path = dir.join(file_name);
        ensure_parent(&path)?;
        let body = serde_json::to_vec_pretty(self).context("serializing evaluation report")?;
        std::fs::write(&path, body)
            .with_context(|| format!("writing report to {}", path.display()))?;
        Ok(path)
    }
}
