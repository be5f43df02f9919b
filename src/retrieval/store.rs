//! The vector store: owns the flat index, the id manifest, and the chunk
//! side table, and pairs them with their on-disk representation.
//!
//! One instance per corpus snapshot. `build` replaces any prior in-memory
//! state atomically (the new state is assembled off to the side and swapped
//! in whole), so a concurrent reader of a shared, already-built store never
//! observes a half-built index. After build/load the store is read-only
//! and safe to share without locking.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::embeddings::{Embedder, EmbeddingError};
use super::index::{FlatIndex, IndexError, Metric};
use super::storage::{IndexStorage, Manifest, StorageError};
use crate::corpus::ChunkRecord;

/// Chunk contents are embedded in batches of this many texts.
const EMBED_BATCH_SIZE: usize = 32;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("duplicate chunk id in corpus: {0}")]
    DuplicateId(String),

    #[error("no index has been built or loaded yet")]
    NotBuilt,

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result of trying to restore a persisted index.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Index and manifest restored; the store is queryable.
    Loaded { documents: usize },
    /// Nothing persisted yet, as expected on first run; call `build`.
    NotFound,
    /// Artifacts exist but could not be used (corrupt, truncated, model or
    /// manifest mismatch). The index stays unset; rebuild from source.
    Failed { reason: String },
}

/// Store statistics, serializable for CLI/API output.
#[derive(Clone, Debug, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub backend: String,
    pub embedding_dimensions: usize,
    pub exists: bool,
    pub persisted: bool,
    pub persist_dir: String,
}

struct IndexState {
    index: FlatIndex,
    id_map: Vec<String>,
    /// Side table: chunk id -> full record. Every id in `id_map` should
    /// resolve here; a miss is a stale-index condition handled by callers.
    chunks: HashMap<String, ChunkRecord>,
}

/// Vector store over one embedding provider and one metric.
pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    metric: Metric,
    storage: IndexStorage,
    state: Option<IndexState>,
}

impl VectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, metric: Metric, persist_dir: PathBuf) -> Self {
        Self {
            embedder,
            metric,
            storage: IndexStorage::new(persist_dir),
            state: None,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// True once `build` or `load` has produced a queryable index.
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Number of indexed documents (0 when unset).
    pub fn len(&self) -> usize {
        self.state.as_ref().map(|s| s.index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embed the corpus and build a fresh index.
    ///
    /// Fails on an empty corpus or on any embedding failure. There is no
    /// partially-built state; the previous index (if any) stays in place
    /// until the replacement is complete.
    pub fn build(&mut self, chunks: &[ChunkRecord]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Err(StoreError::EmptyCorpus);
        }

        let dimensions = self.embedder.dimensions();
        let mut index = FlatIndex::with_capacity(dimensions, self.metric, chunks.len())?;
        let mut id_map = Vec::with_capacity(chunks.len());
        let mut table: HashMap<String, ChunkRecord> = HashMap::with_capacity(chunks.len());

        log::info!(
            "building {} index over {} chunks ({dimensions}D)",
            self.metric.name(),
            chunks.len()
        );

        let bar = ProgressBar::new(chunks.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("embedding {pos}/{len} {bar:30}")
                .expect("static template is valid"),
        );

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.encode(&texts)?;

            for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                if table.contains_key(&chunk.id) {
                    return Err(StoreError::DuplicateId(chunk.id.clone()));
                }
                index.push(vector)?;
                id_map.push(chunk.id.clone());
                table.insert(chunk.id.clone(), chunk.clone());
            }
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        // Swap in the fully-assembled state.
        self.state = Some(IndexState {
            index,
            id_map,
            chunks: table,
        });

        log::info!("index built: {} documents", chunks.len());
        Ok(())
    }

    /// Serialize the index and its manifest to the persist directory.
    ///
    /// A failure here leaves the in-memory index untouched and usable for
    /// the rest of the process lifetime.
    pub fn persist(&self) -> Result<(), StoreError> {
        let state = self.state.as_ref().ok_or(StoreError::NotBuilt)?;

        let manifest = Manifest {
            id_map: state.id_map.clone(),
            total_documents: state.index.len(),
            embedding_dimension: state.index.dimensions(),
        };

        self.storage
            .save(&state.index, &manifest, &self.embedder.model_id())?;
        Ok(())
    }

    /// Try to restore a persisted index, joining chunk metadata back in
    /// from the prepared corpus.
    ///
    /// Manifest ids with no corpus record are tolerated here (the index
    /// stays useful for the rest of the corpus) but logged as a
    /// data-integrity warning; queries skip those positions.
    pub fn load(&mut self, corpus: &[ChunkRecord]) -> LoadOutcome {
        let pair = match self.storage.load(&self.embedder.model_id()) {
            Ok(Some(pair)) => pair,
            Ok(None) => return LoadOutcome::NotFound,
            Err(err) => {
                log::warn!("could not load persisted index: {err}");
                return LoadOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };
        let (index, manifest) = pair;

        if index.dimensions() != self.embedder.dimensions() {
            let reason = format!(
                "persisted dimension {} != provider dimension {}",
                index.dimensions(),
                self.embedder.dimensions()
            );
            log::warn!("could not load persisted index: {reason}");
            return LoadOutcome::Failed { reason };
        }
        if index.metric() != self.metric {
            let reason = format!(
                "persisted metric {} != configured metric {}",
                index.metric().name(),
                self.metric.name()
            );
            log::warn!("could not load persisted index: {reason}");
            return LoadOutcome::Failed { reason };
        }

        let mut table: HashMap<String, ChunkRecord> = HashMap::with_capacity(corpus.len());
        for record in corpus {
            table.insert(record.id.clone(), record.clone());
        }

        let unresolved = manifest
            .id_map
            .iter()
            .filter(|id| !table.contains_key(*id))
            .count();
        if unresolved > 0 {
            log::warn!(
                "data integrity: {unresolved} of {} indexed ids are missing from the corpus; \
                 their positions will be skipped (was the corpus file regenerated without a rebuild?)",
                manifest.id_map.len()
            );
        }

        let documents = index.len();
        self.state = Some(IndexState {
            index,
            id_map: manifest.id_map,
            chunks: table,
        });

        LoadOutcome::Loaded { documents }
    }

    /// k-nearest-neighbor query against the raw index.
    ///
    /// Returns `(position, distance)` ordered by ascending distance. An
    /// unset index or `k == 0` yields an empty list, not an error; `k` is
    /// clamped to the document count.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(usize, f32)>, StoreError> {
        let Some(state) = self.state.as_ref() else {
            return Ok(vec![]);
        };
        Ok(state.index.search(vector, k)?)
    }

    /// Resolve a query position back to its chunk record.
    ///
    /// `None` for out-of-range positions or ids missing from the side
    /// table; both are stale-index conditions the caller should skip.
    pub fn resolve(&self, position: usize) -> Option<&ChunkRecord> {
        let state = self.state.as_ref()?;
        let id = state.id_map.get(position)?;
        state.chunks.get(id)
    }

    /// Chunk id at a given index position.
    pub fn id_at(&self, position: usize) -> Option<&str> {
        let state = self.state.as_ref()?;
        state.id_map.get(position).map(|s| s.as_str())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_documents: self.len(),
            backend: self.metric.name().to_string(),
            embedding_dimensions: self
                .state
                .as_ref()
                .map(|s| s.index.dimensions())
                .unwrap_or_else(|| self.embedder.dimensions()),
            exists: self.is_ready(),
            persisted: self.storage.exists(),
            persist_dir: self.storage.dir().display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{chunk, MockEmbedder};

    fn store_with(vocab: &[&'static str], dir: &std::path::Path) -> VectorStore {
        VectorStore::new(
            Arc::new(MockEmbedder::new(vocab)),
            Metric::L2,
            dir.join("index"),
        )
    }

    fn sample_corpus() -> Vec<ChunkRecord> {
        vec![
            chunk("https://acme.test/a", 0, "alpha alpha beta"),
            chunk("https://acme.test/a", 1, "beta gamma"),
            chunk("https://acme.test/b", 0, "delta epsilon"),
        ]
    }

    const VOCAB: &[&'static str] = &["alpha", "beta", "gamma", "delta", "epsilon"];

    #[test]
    fn test_build_empty_corpus_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(VOCAB, dir.path());
        assert!(matches!(store.build(&[]), Err(StoreError::EmptyCorpus)));
        assert!(!store.is_ready());
    }

    #[test]
    fn test_build_duplicate_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(VOCAB, dir.path());

        let mut corpus = sample_corpus();
        corpus[1].id = corpus[0].id.clone();
        assert!(matches!(
            store.build(&corpus),
            Err(StoreError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_query_unset_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(VOCAB, dir.path());
        let hits = store.query(&[0.0; 5], 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_build_query_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(VOCAB, dir.path());
        store.build(&sample_corpus()).unwrap();

        assert!(store.is_ready());
        assert_eq!(store.len(), 3);

        let query = store.embedder().encode_one("alpha beta").unwrap();
        let hits = store.query(&query, 10).unwrap();
        assert_eq!(hits.len(), 3); // k clamped to corpus size

        let top = store.resolve(hits[0].0).unwrap();
        assert_eq!(top.id, "https://acme.test/a_0");
    }

    #[test]
    fn test_persist_without_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(VOCAB, dir.path());
        assert!(matches!(store.persist(), Err(StoreError::NotBuilt)));
    }

    #[test]
    fn test_load_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(VOCAB, dir.path());
        assert!(matches!(store.load(&sample_corpus()), LoadOutcome::NotFound));
        assert!(!store.is_ready());
    }

    #[test]
    fn test_persist_load_round_trip_same_results() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = sample_corpus();

        let mut store = store_with(VOCAB, dir.path());
        store.build(&corpus).unwrap();
        store.persist().unwrap();

        let query = store.embedder().encode_one("beta gamma").unwrap();
        let before = store.query(&query, 3).unwrap();

        let mut reloaded = store_with(VOCAB, dir.path());
        match reloaded.load(&corpus) {
            LoadOutcome::Loaded { documents } => assert_eq!(documents, 3),
            other => panic!("expected Loaded, got {other:?}"),
        }

        let after = reloaded.query(&query, 3).unwrap();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.0, a.0);
            assert!((b.1 - a.1).abs() < 1e-6);
            assert_eq!(store.id_at(b.0), reloaded.id_at(a.0));
        }
    }

    #[test]
    fn test_load_metric_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = sample_corpus();

        let mut store = store_with(VOCAB, dir.path());
        store.build(&corpus).unwrap();
        store.persist().unwrap();

        let mut cosine_store = VectorStore::new(
            Arc::new(MockEmbedder::new(VOCAB)),
            Metric::Cosine,
            dir.path().join("index"),
        );
        assert!(matches!(
            cosine_store.load(&corpus),
            LoadOutcome::Failed { .. }
        ));
        assert!(!cosine_store.is_ready());
    }

    #[test]
    fn test_load_with_stale_corpus_skips_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = sample_corpus();

        let mut store = store_with(VOCAB, dir.path());
        store.build(&corpus).unwrap();
        store.persist().unwrap();

        // Reload against a corpus missing the middle record.
        let partial: Vec<ChunkRecord> = corpus
            .iter()
            .filter(|c| c.id != "https://acme.test/a_1")
            .cloned()
            .collect();

        let mut reloaded = store_with(VOCAB, dir.path());
        assert!(matches!(reloaded.load(&partial), LoadOutcome::Loaded { .. }));

        // Position 1 resolves to nothing; 0 and 2 still resolve.
        assert!(reloaded.resolve(0).is_some());
        assert!(reloaded.resolve(1).is_none());
        assert!(reloaded.resolve(2).is_some());
    }

    #[test]
    fn test_embedding_failure_aborts_build_keeping_prior_index() {
        use crate::tests::support::FailingEmbedder;

        let dir = tempfile::tempdir().unwrap();
        // One successful encode call covers the first build's single batch.
        let mut store = VectorStore::new(
            Arc::new(FailingEmbedder::new(VOCAB, 1)),
            Metric::L2,
            dir.path().join("index"),
        );
        store.build(&sample_corpus()).unwrap();
        assert_eq!(store.len(), 3);

        // Provider is now exhausted: the rebuild fails outright and the
        // previous index stays queryable.
        let result = store.build(&[chunk("https://acme.test/c", 0, "gamma")]);
        assert!(matches!(result, Err(StoreError::Embedding(_))));
        assert_eq!(store.len(), 3);
        assert!(store.is_ready());
    }

    #[test]
    fn test_rebuild_replaces_index_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(VOCAB, dir.path());
        store.build(&sample_corpus()).unwrap();
        assert_eq!(store.len(), 3);

        let smaller = vec![chunk("https://acme.test/c", 0, "gamma delta")];
        store.build(&smaller).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.id_at(0), Some("https://acme.test/c_0"));
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(VOCAB, dir.path());

        let stats = store.stats();
        assert_eq!(stats.total_documents, 0);
        assert!(!stats.exists);
        assert!(!stats.persisted);

        store.build(&sample_corpus()).unwrap();
        store.persist().unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.backend, "flat-l2");
        assert_eq!(stats.embedding_dimensions, VOCAB.len());
        assert!(stats.exists);
        assert!(stats.persisted);
    }
}
