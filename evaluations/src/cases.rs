//! Recorded retrieval cases loaded from YAML.

use std::path::Path;

use anyhow::{Context, Result};
use retrieval_pipeline::QueryStyle;
use serde::Deserialize;

/// One recorded vector hit.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedHit {
    pub item_id: String,
    pub score: f32,
}

/// A query together with what each retriever returned for it and the items a reviewer
/// marked as correct.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalCase {
    #[serde(default)]
    pub id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub style: Option<QueryStyle>,
    /// Lexical hits in rank order.
    #[serde(default)]
    pub lexical: Vec<String>,
    #[serde(default)]
    pub vector: Vec<RecordedHit>,
    #[serde(default)]
    pub expected: Vec<String>,
    #[serde(default)]
    pub boost_keywords: Option<Vec<String>>,
}

impl EvalCase {
    pub fn label(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("case-{}", index.saturating_add(1)))
    }
}

#[derive(Debug, Deserialize)]
struct CaseFile {
    cases: Vec<EvalCase>,
}

pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading cases from {}", path.display()))?;
    parse_cases(&raw).with_context(|| format!("parsing cases in {}", path.display()))
}

pub fn parse_cases(raw: &str) -> Result<Vec<EvalCase>> {
    let file: CaseFile = serde_yaml::from_str(raw)?;
    Ok(file.cases)
}
