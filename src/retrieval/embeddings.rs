//! Embedding provider boundary.
//!
//! The rest of the crate only sees [`Embedder`]: a deterministic map from
//! texts to fixed-length float vectors. The production implementation wraps
//! fastembed; tests substitute a deterministic mock. Build and query must
//! use the same provider/model; the persisted index header carries a hash
//! of the model name so a mismatch is caught at load time rather than
//! silently returning garbage neighbors.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use fastembed::{InitOptions, TextEmbedding};

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("model initialization failed: {0}")]
    InitFailed(String),

    #[error("embedding generation failed: {0}")]
    EncodeFailed(String),

    #[error("embedding model produced zero-dimension vectors")]
    ZeroDimension,

    #[error("invalid model name: {0}")]
    InvalidModel(String),
}

/// Text-to-vector provider.
///
/// Every vector returned within one provider's lifetime has the same
/// dimension, and encoding is deterministic for a fixed model.
pub trait Embedder: Send + Sync {
    /// Encode a batch of texts into one vector each, preserving order.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Vector dimension produced by this provider.
    fn dimensions(&self) -> usize;

    /// Stable 32-byte identifier of the underlying model, stamped into the
    /// persisted index header for build/query model matching.
    fn model_id(&self) -> [u8; 32];

    /// Encode a single text.
    fn encode_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.encode(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::EncodeFailed("no embedding returned".to_string()))
    }
}

/// Cosine similarity between two embedding vectors.
///
/// The small epsilon keeps the division defined for degenerate
/// (all-zero) vectors, for which the similarity comes out as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    const EPS: f32 = 1e-8;

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    dot / (norm_a * norm_b + EPS)
}

/// Fastembed-backed embedding model.
///
/// Models are downloaded on first use and cached in the `models/`
/// subdirectory of the data dir. fastembed's `embed()` takes `&mut self`,
/// hence the Mutex; callers only ever need `&self`.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load (downloading if necessary) the named model.
    ///
    /// # Arguments
    /// * `model_name` - e.g. "all-MiniLM-L6-v2"
    /// * `cache_dir` - base directory; models land in `<cache_dir>/models`
    /// * `download_timeout` - cap on the first-use download
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;
        let _timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        // Probe the dimension once; every later call must match it.
        let probe = model
            .embed(vec!["probe"], None)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
        let dimensions = probe.first().map(|v| v.len()).unwrap_or(0);
        if dimensions == 0 {
            return Err(EmbeddingError::ZeroDimension);
        }

        log::info!("embedding model '{model_name}' ready ({dimensions} dimensions)");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }
}

impl Embedder for EmbeddingModel {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::EncodeFailed(format!("model lock poisoned: {}", e)))?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EncodeFailed(e.to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> [u8; 32] {
        model_id_hash(&self.model_name)
    }
}

/// SHA-256 of a model name, for stamping into the persisted index header.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Map a model name string onto fastembed's model enum.
fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "bge-large-en-v1.5-q" | "bgelargeenv15q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
        _ => Err(EmbeddingError::InvalidModel(format!(
            "unknown model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q for quantized)",
            name
        ))),
    }
}
