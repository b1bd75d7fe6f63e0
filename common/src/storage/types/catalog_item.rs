use serde::{Deserialize, Serialize};

use super::{deserialize_flexible_list, deserialize_flexible_string, Identified};
use crate::error::AppError;

/// Source tag carried by catalog records in the vector store metadata.
pub const CATALOG_SOURCE: &str = "product_db";

/// A catalog product as handed to the ranking engine.
///
/// Records come from external stores with loosely typed metadata, so every textual field
/// defaults to empty and the ranking code never has to special-case missing values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatalogItem {
    #[serde(
        alias = "item_id",
        alias = "product_id",
        default,
        deserialize_with = "deserialize_flexible_string"
    )]
    pub id: String,
    #[serde(alias = "product_name", default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub price: String,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    pub features: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Full text blob the retrievers indexed for this item.
    #[serde(alias = "page_content", default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Identified for CatalogItem {
    fn get_id(&self) -> &str {
        &self.id
    }
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = price.into();
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Rejects records that cannot take part in fusion because they carry no identity.
    pub fn ensure_identity(&self) -> Result<(), AppError> {
        if self.id.trim().is_empty() {
            return Err(AppError::MalformedCandidate(format!(
                "catalog item '{}' has no identity key",
                self.name
            )));
        }
        Ok(())
    }

    /// Lower-cased name, description and features joined by spaces.
    pub fn descriptive_text(&self) -> String {
        format!(
            "{} {} {}",
            self.name,
            self.description,
            self.features.join(" ")
        )
        .to_lowercase()
    }

    /// Lower-cased content followed by the name; the haystack for caller boost keywords.
    pub fn content_text(&self) -> String {
        format!("{}{}", self.content, self.name).to_lowercase()
    }

    pub fn name_lower(&self) -> String {
        self.name.to_lowercase()
    }

    /// Whether the record belongs to the given source tag. Untagged records are assumed to
    /// be catalog items.
    pub fn matches_source(&self, source: &str) -> bool {
        self.source.as_deref().map_or(true, |tag| tag == source)
    }
}
