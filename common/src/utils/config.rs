use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Process-level settings for the ranking engine.
///
/// Every field is optional; unset values fall back to the defaults baked into the
/// retrieval tuning and keyword tables.
#[derive(Clone, Deserialize, Debug, Default)]
pub struct AppConfig {
    /// Path to a keyword table file (any format the `config` crate reads).
    #[serde(default)]
    pub keyword_tables_path: Option<String>,
    /// Path to a catalog JSON file used by the in-memory catalog store.
    #[serde(default)]
    pub catalog_path: Option<String>,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub result_limit: Option<usize>,
    #[serde(default)]
    pub lexical_weight: Option<f32>,
    #[serde(default)]
    pub vector_weight: Option<f32>,
    #[serde(default)]
    pub enable_category_weighting: Option<bool>,
    /// Upper bound for a single retriever call, in milliseconds.
    #[serde(default)]
    pub retrieval_timeout_ms: Option<u64>,
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

/// Same as [`get_config`] but reads the file source from an explicit path.
pub fn get_config_from_path(path: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name(path).required(true))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
