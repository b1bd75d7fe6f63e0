//! Retrievers that answer from a recorded case instead of a live index.

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{catalog::CatalogStore, types::catalog_item::CatalogItem},
};
use retrieval_pipeline::{
    lexical::LexicalRetriever,
    vector::{VectorHit, VectorRetriever},
};
use tracing::warn;

use crate::cases::EvalCase;

/// Replays the lexical and vector hits recorded for one case. Recorded ids missing from
/// the catalog are skipped.
pub struct ReplayRetrievers {
    lexical: Vec<CatalogItem>,
    vector: Vec<VectorHit>,
}

impl ReplayRetrievers {
    pub fn from_case(case: &EvalCase, catalog: &CatalogStore) -> Self {
        let lexical = case
            .lexical
            .iter()
            .filter_map(|id| lookup(catalog, id))
            .collect();
        let vector = case
            .vector
            .iter()
            .filter_map(|hit| lookup(catalog, &hit.item_id).map(|item| VectorHit::new(item, hit.score)))
            .collect();
        Self { lexical, vector }
    }

    pub fn lexical_len(&self) -> usize {
        self.lexical.len()
    }

    pub fn vector_len(&self) -> usize {
        self.vector.len()
    }
}

fn lookup(catalog: &CatalogStore, id: &str) -> Option<CatalogItem> {
    let item = catalog.get(id).cloned();
    if item.is_none() {
        warn!(item_id = id, "Recorded hit is not in the catalog; skipping");
    }
    item
}

#[async_trait]
impl LexicalRetriever for ReplayRetrievers {
    async fn search(&self, _query: &str, take: usize) -> Result<Vec<CatalogItem>, AppError> {
        Ok(self.lexical.iter().take(take).cloned().collect())
    }
}

#[async_trait]
impl VectorRetriever for ReplayRetrievers {
    async fn search(
        &self,
        _query: &str,
        take: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<VectorHit>, AppError> {
        Ok(self
            .vector
            .iter()
            .filter(|hit| source_filter.map_or(true, |source| hit.item.matches_source(source)))
            .take(take)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::RecordedHit;

    fn case() -> EvalCase {
        EvalCase {
            id: None,
            query: "speaker".into(),
            style: None,
            lexical: vec!["A".into(), "missing".into(), "B".into()],
            vector: vec![
                RecordedHit {
                    item_id: "B".into(),
                    score: 0.9,
                },
                RecordedHit {
                    item_id: "A".into(),
                    score: 0.4,
                },
            ],
            expected: vec![],
            boost_keywords: None,
        }
    }

    #[tokio::test]
    async fn replays_recorded_hits_in_order() {
        let catalog = CatalogStore::from_items(vec![
            CatalogItem::new("A", "A speaker", "audio equipment"),
            CatalogItem::new("B", "B speaker", "audio equipment"),
        ]);
        let replay = ReplayRetrievers::from_case(&case(), &catalog);

        assert_eq!(replay.lexical_len(), 2);
        let lexical = LexicalRetriever::search(&replay, "speaker", 1)
            .await
            .expect("lexical replay");
        assert_eq!(lexical[0].id, "A");

        let vector = VectorRetriever::search(&replay, "speaker", 10, None)
            .await
            .expect("vector replay");
        let ids: Vec<_> = vector.iter().map(|hit| hit.item.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }
}
