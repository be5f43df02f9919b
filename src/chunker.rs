//! Similarity-threshold semantic chunking.
//!
//! Page text is split into sentences; adjacent sentences are grouped into
//! chunks while the embedding of each new sentence stays close (cosine)
//! to the embedding of the last sentence already in the chunk. Boundaries
//! therefore land where the topic shifts, which beats fixed-size windows
//! for retrieval context: a chunk reads as one coherent passage.
//!
//! Each candidate is compared against the previous sentence only, not a
//! running centroid. That choice is load-bearing: changing it moves every
//! chunk boundary, which invalidates any persisted index built on the old
//! boundaries.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::retrieval::embeddings::{cosine_similarity, Embedder, EmbeddingError};

/// A sentence ends at `.`, `!` or `?` followed by whitespace.
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("static sentence pattern is valid"));

/// Chunking parameters.
#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    /// Cosine similarity below which a new chunk starts. Must be in (0, 1).
    pub similarity_threshold: f32,
    /// Documents with at most this many sentences become a single chunk.
    pub min_chunk_sentences: usize,
    /// Hard cap on sentences per chunk.
    pub max_chunk_sentences: usize,
    /// Chunks with fewer words than this are discarded as fragments.
    pub min_chunk_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            min_chunk_sentences: 2,
            max_chunk_sentences: 8,
            min_chunk_words: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunker config: {0}")]
    InvalidConfig(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Splits one document's plain text into topically coherent chunks.
pub struct SemanticChunker {
    config: ChunkerConfig,
    embedder: Arc<dyn Embedder>,
}

impl SemanticChunker {
    pub fn new(config: ChunkerConfig, embedder: Arc<dyn Embedder>) -> Result<Self, ChunkError> {
        if !(config.similarity_threshold > 0.0 && config.similarity_threshold < 1.0) {
            return Err(ChunkError::InvalidConfig(format!(
                "similarity_threshold must be in (0, 1), got {}",
                config.similarity_threshold
            )));
        }
        if config.min_chunk_sentences < 1 {
            return Err(ChunkError::InvalidConfig(
                "min_chunk_sentences must be at least 1".to_string(),
            ));
        }
        if config.max_chunk_sentences < config.min_chunk_sentences {
            return Err(ChunkError::InvalidConfig(format!(
                "max_chunk_sentences {} < min_chunk_sentences {}",
                config.max_chunk_sentences, config.min_chunk_sentences
            )));
        }

        Ok(Self { config, embedder })
    }

    /// Chunk one document. Output preserves reading order and is
    /// deterministic for a fixed embedding provider.
    ///
    /// May legitimately return no chunks (blank input, or every candidate
    /// fell under the word-count floor); the document simply contributed
    /// no indexable content.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>, ChunkError> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Ok(vec![]);
        }

        // Short documents are not worth splitting; note this path skips the
        // word-count filter so a tiny page still yields its one chunk.
        if sentences.len() <= self.config.min_chunk_sentences {
            return Ok(vec![sentences.join(" ")]);
        }

        let texts: Vec<String> = sentences.iter().map(|s| s.to_string()).collect();
        let embeddings = self.embedder.encode(&texts)?;

        let mut chunks: Vec<Vec<&str>> = Vec::new();
        let mut current = vec![sentences[0]];
        let mut last_embedded = 0usize;

        for i in 1..sentences.len() {
            let sim = cosine_similarity(&embeddings[last_embedded], &embeddings[i]);
            if sim >= self.config.similarity_threshold
                && current.len() < self.config.max_chunk_sentences
            {
                current.push(sentences[i]);
            } else {
                chunks.push(std::mem::replace(&mut current, vec![sentences[i]]));
            }
            last_embedded = i;
        }
        chunks.push(current);

        Ok(chunks
            .into_iter()
            .map(|sentences| sentences.join(" "))
            .filter(|chunk| chunk.split_whitespace().count() >= self.config.min_chunk_words)
            .collect())
    }
}

/// Split text into sentences on terminator-plus-whitespace boundaries.
/// The terminator stays with its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    if text.is_empty() {
        return vec![];
    }

    let mut sentences = Vec::new();
    let mut start = 0usize;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // The match covers the terminator and the whitespace run after it;
        // the sentence ends just past the terminator.
        let end = boundary.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}
