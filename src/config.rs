use std::path::PathBuf;

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::chunker::ChunkerConfig;
use crate::retrieval::Metric;

/// Default embedding model (MiniLM keeps the first-run download small)
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Default index backend
const DEFAULT_BACKEND: &str = "flat-l2";
/// Default number of results per query
const DEFAULT_TOP_K: usize = 5;

const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_LLM_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Chunking parameters as they appear in config.yaml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Cosine similarity boundary for starting a new chunk, in (0, 1)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Documents with at most this many sentences stay whole
    #[serde(default = "default_min_chunk_sentences")]
    pub min_chunk_sentences: usize,

    /// Hard cap on sentences per chunk
    #[serde(default = "default_max_chunk_sentences")]
    pub max_chunk_sentences: usize,

    /// Minimum words for a chunk to be kept
    #[serde(default = "default_min_chunk_words")]
    pub min_chunk_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_chunk_sentences: default_min_chunk_sentences(),
            max_chunk_sentences: default_max_chunk_sentences(),
            min_chunk_words: default_min_chunk_words(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.75
}

fn default_min_chunk_sentences() -> usize {
    2
}

fn default_max_chunk_sentences() -> usize {
    8
}

fn default_min_chunk_words() -> usize {
    10
}

/// Embedding provider configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g. "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

/// Index backend selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// "flat-l2" or "flat-cosine"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Default number of results per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            top_k: default_top_k(),
        }
    }
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Answer-generation collaborator configuration.
///
/// The API key itself is never stored here; only the name of the
/// environment variable that holds it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Environment variable holding the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// How the assistant refers to the site it answers for
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            api_key_env: default_llm_api_key_env(),
            site_name: default_site_name(),
        }
    }
}

fn default_llm_api_url() -> String {
    DEFAULT_LLM_API_URL.to_string()
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_llm_temperature() -> f32 {
    0.3
}

fn default_llm_max_tokens() -> u32 {
    1000
}

fn default_llm_api_key_env() -> String {
    DEFAULT_LLM_API_KEY_ENV.to_string()
}

fn default_site_name() -> String {
    "our website".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&mut self) {
        let c = &self.chunking;
        if !(c.similarity_threshold > 0.0 && c.similarity_threshold < 1.0) {
            panic!(
                "chunking.similarity_threshold must be strictly between 0.0 and 1.0, got {}",
                c.similarity_threshold
            );
        }
        if c.min_chunk_sentences == 0 {
            panic!("chunking.min_chunk_sentences must be at least 1");
        }
        if c.max_chunk_sentences < c.min_chunk_sentences {
            panic!(
                "chunking.max_chunk_sentences ({}) must not be below chunking.min_chunk_sentences ({})",
                c.max_chunk_sentences, c.min_chunk_sentences
            );
        }

        if Metric::parse(&self.index.backend).is_none() {
            panic!(
                "index.backend must be 'flat-l2' or 'flat-cosine', got '{}'",
                self.index.backend
            );
        }
        if self.index.top_k == 0 {
            panic!("index.top_k must be at least 1");
        }

        if self.embedding.download_timeout_secs == 0 {
            panic!("embedding.download_timeout_secs must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            panic!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            );
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        std::fs::create_dir_all(base_path).expect("could not create data directory");
        let config_path = PathBuf::from(base_path).join("config.yaml");

        // create new if does not exist
        if !config_path.exists() {
            std::fs::write(
                &config_path,
                serde_yml::to_string(&Self::default()).unwrap(),
            )
            .expect("could not write default config");
        }

        let config_str =
            std::fs::read_to_string(&config_path).expect("config file is not readable");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let config_path = PathBuf::from(&self.base_path).join("config.yaml");
        let config_str = serde_yml::to_string(&self).unwrap();
        std::fs::write(config_path, config_str).expect("could not write config");
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Scraped page records, as produced by the page-fetching collaborator.
    pub fn pages_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path).join("data").join("pages.json")
    }

    /// Prepared chunk records (output of `prepare`, input of `build`).
    pub fn chunks_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path)
            .join("data")
            .join("prepared_data.json")
    }

    /// Directory holding vectors.bin + manifest.json.
    pub fn index_dir(&self) -> PathBuf {
        PathBuf::from(&self.base_path).join("index")
    }

    pub fn metric(&self) -> Metric {
        // validate() already guaranteed this parses
        Metric::parse(&self.index.backend).expect("backend was validated")
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            similarity_threshold: self.chunking.similarity_threshold,
            min_chunk_sentences: self.chunking.min_chunk_sentences,
            max_chunk_sentences: self.chunking.max_chunk_sentences,
            min_chunk_words: self.chunking.min_chunk_words,
        }
    }
}

/// Resolve the data directory: `SITEQA_BASE_PATH` env var, or
/// `~/.local/share/siteqa`.
pub fn default_base_path() -> String {
    std::env::var("SITEQA_BASE_PATH").unwrap_or_else(|_| {
        format!(
            "{}/.local/share/siteqa",
            my_home()
                .expect("couldnt find home dir")
                .expect("couldnt find home dir")
                .to_string_lossy()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = Config::default();
        config.validate();
        assert_eq!(config.index.top_k, 5);
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(config.metric(), Metric::L2);
    }

    #[test]
    #[should_panic(expected = "similarity_threshold")]
    fn test_bad_threshold_panics() {
        let mut config = Config::default();
        config.chunking.similarity_threshold = 1.5;
        config.validate();
    }

    #[test]
    #[should_panic(expected = "index.backend")]
    fn test_bad_backend_panics() {
        let mut config = Config::default();
        config.index.backend = "hnsw".to_string();
        config.validate();
    }

    #[test]
    fn test_load_with_creates_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let config = Config::load_with(base);
        assert!(dir.path().join("config.yaml").exists());
        assert_eq!(config.base_path(), base);

        // second load parses the file written by the first
        let reloaded = Config::load_with(base);
        assert_eq!(reloaded.index.backend, config.index.backend);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "index:\n  backend: flat-cosine\n",
        )
        .unwrap();

        let config = Config::load_with(base);
        assert_eq!(config.metric(), Metric::Cosine);
        assert_eq!(config.index.top_k, 5);
        assert!((config.chunking.similarity_threshold - 0.75).abs() < f32::EPSILON);
    }
}
