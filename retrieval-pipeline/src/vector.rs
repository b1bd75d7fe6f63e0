use async_trait::async_trait;
use tracing::debug;

use common::{error::AppError, storage::types::catalog_item::CatalogItem};

use crate::{fusion::RawCandidate, scoring::sanitize_unit};

/// One semantic nearest-neighbour hit. `similarity` is expected in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub item: CatalogItem,
    pub similarity: f32,
}

impl VectorHit {
    pub fn new(item: CatalogItem, similarity: f32) -> Self {
        Self { item, similarity }
    }
}

/// Embedding-backed similarity search. Implementations may use `source_filter` to restrict
/// hits to one document source; the caller filters again regardless.
#[async_trait]
pub trait VectorRetriever: Send + Sync {
    async fn search(
        &self,
        query: &str,
        take: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<VectorHit>, AppError>;
}

/// Runs the vector retriever and keeps hits at or above `min_similarity` from `source`.
pub async fn find_items_by_vector_similarity(
    retriever: &dyn VectorRetriever,
    query: &str,
    take: usize,
    min_similarity: f32,
    source: &str,
) -> Result<Vec<RawCandidate>, AppError> {
    let hits = retriever.search(query, take, Some(source)).await?;
    let returned = hits.len();

    let candidates: Vec<RawCandidate> = hits
        .into_iter()
        .filter(|hit| hit.item.matches_source(source))
        .filter_map(|hit| {
            let similarity = sanitize_unit(hit.similarity);
            (similarity >= min_similarity).then(|| RawCandidate::vector(hit.item, similarity))
        })
        .collect();

    debug!(
        limit = take,
        returned,
        kept = candidates.len(),
        min_similarity,
        "Vector retrieval finished"
    );

    Ok(candidates)
}
