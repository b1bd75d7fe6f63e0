use async_trait::async_trait;
use tracing::debug;

use common::{
    error::AppError,
    storage::{catalog::CatalogStore, types::catalog_item::CatalogItem},
};

use crate::{fusion::RawCandidate, scoring::rank_to_score};

/// Keyword retriever that returns catalog items in rank order without comparable scores.
#[async_trait]
pub trait LexicalRetriever: Send + Sync {
    async fn search(&self, query: &str, take: usize) -> Result<Vec<CatalogItem>, AppError>;
}

#[async_trait]
impl LexicalRetriever for CatalogStore {
    async fn search(&self, query: &str, take: usize) -> Result<Vec<CatalogItem>, AppError> {
        Ok(self.keyword_search(query, take))
    }
}

/// Runs the lexical retriever and converts hit ranks into `[0, 1]` pseudo-scores.
///
/// Items tagged with another source are removed before ranking so the pseudo-scores only
/// reflect catalog hits.
pub async fn find_items_by_lexical_rank(
    retriever: &dyn LexicalRetriever,
    query: &str,
    take: usize,
    source: &str,
) -> Result<Vec<RawCandidate>, AppError> {
    let hits = retriever.search(query, take).await?;
    let returned = hits.len();

    let items: Vec<CatalogItem> = hits
        .into_iter()
        .filter(|item| item.matches_source(source))
        .collect();
    let total = items.len();

    debug!(
        limit = take,
        returned,
        kept = total,
        "Lexical retrieval finished"
    );

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(rank, item)| RawCandidate::lexical(item, rank_to_score(rank, total)))
        .collect())
}
