//! Query-side view of the store: free-text query in, ranked and annotated
//! results out.

use serde::Serialize;

use super::store::VectorStore;

/// Provenance attached to a search result.
#[derive(Clone, Debug, Serialize)]
pub struct ResultMetadata {
    pub url: String,
    pub title: String,
    pub chunk_id: usize,
}

/// One ranked result.
///
/// `relevance_score` is a higher-is-better transform of `distance`; which
/// transform depends on the store's metric (see [`super::index::Metric`]),
/// so scores are only comparable within one backend configuration.
#[derive(Clone, Debug, Serialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: ResultMetadata,
    pub distance: f32,
    pub relevance_score: f32,
}

/// Retriever over a built (read-only) store.
pub struct Retriever<'a> {
    store: &'a VectorStore,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a VectorStore) -> Self {
        Self { store }
    }

    /// Search for the `top_k` chunks closest to `query`.
    ///
    /// Never fails: an unset/empty index yields no results, and an
    /// embedding-provider failure degrades this one query to an empty
    /// result set rather than propagating. The query is embedded with the
    /// provider the store was built with; pointing build and query at
    /// different models is a configuration error this layer cannot detect.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        if !self.store.is_ready() {
            log::debug!("search on unset index returns no results");
            return vec![];
        }

        let query_vector = match self.store.embedder().encode_one(query) {
            Ok(v) => v,
            Err(err) => {
                log::error!("failed to embed query: {err}");
                return vec![];
            }
        };

        let hits = match self.store.query(&query_vector, top_k) {
            Ok(hits) => hits,
            Err(err) => {
                log::error!("index query failed: {err}");
                return vec![];
            }
        };

        let metric = self.store.metric();
        let mut results = Vec::with_capacity(hits.len());
        for (position, distance) in hits {
            let Some(chunk) = self.store.resolve(position) else {
                // Stale pairing between index and corpus; skip rather than
                // return a result attributed to the wrong document.
                log::warn!("data integrity: position {position} does not resolve to a chunk");
                continue;
            };

            results.push(SearchResult {
                content: chunk.content.clone(),
                metadata: ResultMetadata {
                    url: chunk.url.clone(),
                    title: chunk.title.clone(),
                    chunk_id: chunk.chunk_id,
                },
                distance,
                relevance_score: metric.relevance(distance),
            });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::retrieval::index::Metric;
    use crate::tests::support::{chunk, FailingEmbedder, MockEmbedder};

    const VOCAB: &[&'static str] = &["savings", "account", "contact", "support", "card"];

    fn built_store(dir: &std::path::Path) -> VectorStore {
        let mut store = VectorStore::new(
            Arc::new(MockEmbedder::new(VOCAB)),
            Metric::L2,
            dir.join("index"),
        );
        store
            .build(&[
                chunk("https://acme.test/savings", 0, "savings account savings"),
                chunk("https://acme.test/contact", 0, "contact support contact"),
                chunk("https://acme.test/cards", 0, "card card account"),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_search_unset_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(
            Arc::new(MockEmbedder::new(VOCAB)),
            Metric::L2,
            dir.path().join("index"),
        );
        assert!(Retriever::new(&store).search("anything", 5).is_empty());
    }

    #[test]
    fn test_search_ranks_and_annotates() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(dir.path());
        let retriever = Retriever::new(&store);

        let results = retriever.search("contact support", 3);
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].metadata.url, "https://acme.test/contact");
        assert_eq!(results[0].metadata.chunk_id, 0);

        // best-first: ascending distance, descending relevance
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn test_search_top_k_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let store = built_store(dir.path());
        let retriever = Retriever::new(&store);

        assert_eq!(retriever.search("savings", 100).len(), 3);
        assert!(retriever.search("savings", 0).is_empty());
    }

    #[test]
    fn test_embedding_failure_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        // Provider succeeds for the single build batch, then fails.
        let mut store = VectorStore::new(
            Arc::new(FailingEmbedder::new(VOCAB, 1)),
            Metric::L2,
            dir.path().join("index"),
        );
        store
            .build(&[chunk("https://acme.test/a", 0, "savings account")])
            .unwrap();

        let retriever = Retriever::new(&store);
        assert!(retriever.search("savings", 5).is_empty());
    }

    #[test]
    fn test_relevance_uses_cosine_transform() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::new(
            Arc::new(MockEmbedder::new(VOCAB)),
            Metric::Cosine,
            dir.path().join("index"),
        );
        store
            .build(&[chunk("https://acme.test/contact", 0, "contact support")])
            .unwrap();

        let results = Retriever::new(&store).search("contact support", 1);
        assert_eq!(results.len(), 1);
        // identical term profile: distance ~0, relevance ~1 under `1 - d`
        assert!(results[0].distance.abs() < 1e-5);
        assert!((results[0].relevance_score - 1.0).abs() < 1e-5);
    }
}
