//! Corpus record types and JSON I/O.
//!
//! The document source (the scraper) hands us either raw page records or
//! already-prepared chunk records. Both travel as JSON arrays on disk:
//! one array per corpus snapshot.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunker::{ChunkError, SemanticChunker};

/// One scraped page: cleaned plain text plus provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub content: String,
}

/// One indexable chunk of page text.
///
/// `id` is deterministic: source URL + `_` + zero-based chunk ordinal.
/// Records are immutable after preparation; a corpus is only ever replaced
/// wholesale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub chunk_id: usize,
}

/// Errors from corpus file handling.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("corpus file not found: {0} (run the scraper and `siteqa prepare` first)")]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed corpus file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Load prepared chunk records from a JSON array file.
///
/// A missing file is reported as [`CorpusError::NotFound`] so callers can
/// surface a "please run ingestion first" message instead of crashing.
/// Records with empty `id`, `url` or `content` are dropped with a warning;
/// they cannot be indexed or attributed.
pub fn load_chunks(path: &Path) -> Result<Vec<ChunkRecord>, CorpusError> {
    let raw = read_corpus_file(path)?;
    let records: Vec<ChunkRecord> =
        serde_json::from_slice(&raw).map_err(|source| CorpusError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let total = records.len();
    let records: Vec<ChunkRecord> = records
        .into_iter()
        .filter(|r| {
            let ok = !r.id.is_empty() && !r.url.is_empty() && !r.content.trim().is_empty();
            if !ok {
                log::warn!("dropping unusable chunk record (id={:?})", r.id);
            }
            ok
        })
        .collect();

    log::info!("loaded {} text chunks from {:?}", records.len(), path);
    if records.len() < total {
        log::warn!("{} of {} records were unusable", total - records.len(), total);
    }

    Ok(records)
}

/// Load scraped page records from a JSON array file.
pub fn load_pages(path: &Path) -> Result<Vec<PageRecord>, CorpusError> {
    let raw = read_corpus_file(path)?;
    let pages: Vec<PageRecord> =
        serde_json::from_slice(&raw).map_err(|source| CorpusError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    log::info!("loaded {} pages from {:?}", pages.len(), path);
    Ok(pages)
}

/// Write chunk records as pretty-printed JSON, atomically (temp + rename).
pub fn save_chunks(path: &Path, chunks: &[ChunkRecord]) -> Result<(), CorpusError> {
    let data = serde_json::to_vec_pretty(chunks).expect("chunk records serialize infallibly");

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, &data)?;
    std::fs::rename(&temp_path, path)?;

    log::info!("wrote {} chunk records to {:?}", chunks.len(), path);
    Ok(())
}

/// Turn scraped pages into prepared chunk records using the semantic chunker.
///
/// Pages that yield no chunks (all fragments filtered out) contribute
/// nothing to the corpus; that is a valid outcome, not an error.
pub fn prepare_chunks(
    pages: &[PageRecord],
    chunker: &SemanticChunker,
) -> Result<Vec<ChunkRecord>, ChunkError> {
    let mut prepared = Vec::new();

    for page in pages {
        if page.content.trim().is_empty() {
            log::warn!("skipping page with empty content: {}", page.url);
            continue;
        }
        if let Err(err) = url::Url::parse(&page.url) {
            log::warn!("skipping page with unparseable url {:?}: {err}", page.url);
            continue;
        }

        let chunks = chunker.chunk(&page.content)?;
        if chunks.is_empty() {
            log::info!("page contributed no indexable content: {}", page.url);
            continue;
        }

        for (i, content) in chunks.into_iter().enumerate() {
            prepared.push(ChunkRecord {
                id: format!("{}_{}", page.url, i),
                url: page.url.clone(),
                title: page.title.clone(),
                content,
                chunk_id: i,
            });
        }
    }

    Ok(prepared)
}

fn read_corpus_file(path: &Path) -> Result<Vec<u8>, CorpusError> {
    match std::fs::read(path) {
        Ok(raw) => Ok(raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(CorpusError::NotFound(path.to_path_buf()))
        }
        Err(err) => Err(err.into()),
    }
}
