//! Shared test doubles for the retrieval and QA tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::corpus::ChunkRecord;
use crate::retrieval::embeddings::{model_id_hash, Embedder, EmbeddingError};

/// Deterministic term-count embedder over a fixed vocabulary.
///
/// Axis `i` counts occurrences of `vocab[i]` in the lowercased text;
/// vectors are L2-normalized (unless all-zero), so squared-L2 distance and
/// cosine similarity rank identically and tests can reason about geometry
/// exactly. Words outside the vocabulary are ignored.
pub struct MockEmbedder {
    vocab: Vec<&'static str>,
}

impl MockEmbedder {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self {
            vocab: vocab.to_vec(),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut v = vec![0.0f32; self.vocab.len()];
        for word in lowered.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if let Some(axis) = self.vocab.iter().position(|w| *w == word) {
                v[axis] += 1.0;
            }
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for MockEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.vocab.len()
    }

    fn model_id(&self) -> [u8; 32] {
        model_id_hash("mock-term-count")
    }
}

/// Embedder returning fixed vectors per exact text, for tests that need
/// precise geometry (e.g. negative cosine). Unknown texts embed to zeros.
pub struct StaticEmbedder {
    pub dimensions: usize,
    pub table: Vec<(String, Vec<f32>)>,
}

impl StaticEmbedder {
    pub fn new(dimensions: usize, table: &[(&str, &[f32])]) -> Self {
        Self {
            dimensions,
            table: table
                .iter()
                .map(|(t, v)| (t.to_string(), v.to_vec()))
                .collect(),
        }
    }
}

impl Embedder for StaticEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| {
                self.table
                    .iter()
                    .find(|(key, _)| key == t)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0; self.dimensions])
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> [u8; 32] {
        model_id_hash("mock-static")
    }
}

/// Embedder that succeeds for a fixed number of `encode` calls and then
/// fails, for exercising degraded-query paths.
pub struct FailingEmbedder {
    inner: MockEmbedder,
    remaining: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new(vocab: &[&'static str], successful_calls: usize) -> Self {
        Self {
            inner: MockEmbedder::new(vocab),
            remaining: AtomicUsize::new(successful_calls),
        }
    }
}

impl Embedder for FailingEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let prev = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if prev == 0 {
            return Err(EmbeddingError::EncodeFailed(
                "mock provider exhausted".to_string(),
            ));
        }
        self.inner.encode(texts)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> [u8; 32] {
        self.inner.model_id()
    }
}

/// Shorthand chunk record with the deterministic `{url}_{ordinal}` id.
pub fn chunk(url: &str, ordinal: usize, content: &str) -> ChunkRecord {
    ChunkRecord {
        id: format!("{url}_{ordinal}"),
        url: url.to_string(),
        title: format!("Title of {url}"),
        content: content.to_string(),
        chunk_id: ordinal,
    }
}
