//! Answer-confidence scoring.
//!
//! Confidence is the clamped cosine similarity between the question and the
//! single best-matching chunk. It measures topical closeness of the
//! retrieved context to the literal question text, not whether the
//! generated answer is correct, and must only ever be read as advisory.

use crate::retrieval::embeddings::{cosine_similarity, Embedder, EmbeddingError};

/// Score how well the top retrieved chunk supports an answer.
///
/// Returns a value in [0, 1]. Negative cosine floors to 0: "not relevant"
/// reads as zero confidence rather than a negative signal. No results at
/// all scores 0.0.
pub fn score_confidence(
    embedder: &dyn Embedder,
    question: &str,
    top_content: Option<&str>,
) -> Result<f32, EmbeddingError> {
    let Some(content) = top_content else {
        return Ok(0.0);
    };

    let question_vector = embedder.encode_one(question)?;
    let chunk_vector = embedder.encode_one(content)?;

    Ok(cosine_similarity(&question_vector, &chunk_vector).clamp(0.0, 1.0))
}
