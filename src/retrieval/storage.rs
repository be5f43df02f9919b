//! On-disk representation of a built index.
//!
//! Two co-located artifacts, written together and read together:
//!
//! `vectors.bin`: header (48 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the embedding model name)
//! - metric: u8 (0 = flat-l2, 1 = flat-cosine)
//! - dimensions: u16 (little-endian)
//! - row_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of the header fields before it)
//!
//! followed by `row_count * dimensions` little-endian f32 values in
//! position order.
//!
//! `manifest.json`: `{id_map, total_documents, embedding_dimension}`,
//! the position -> chunk-id ordering frozen at persist time. The manifest is
//! never rewritten independently of the vector file: a position/id mismatch
//! returns the wrong documents for the right scores.
//!
//! Writes go to temp paths first and are renamed into place so a crashed
//! writer never leaves a reader with one artifact updated and the other
//! stale.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::index::{FlatIndex, Metric};

/// Current vectors.bin format version
const FORMAT_VERSION: u8 = 1;

/// Header size: version(1) + model_id(32) + metric(1) + dimensions(2) + row_count(8) + checksum(4)
const HEADER_SIZE: usize = 48;

const VECTORS_FILE: &str = "vectors.bin";
const MANIFEST_FILE: &str = "manifest.json";

/// Position -> chunk-id ordering plus corpus counts, persisted as JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub id_map: Vec<String>,
    pub total_documents: usize,
    pub embedding_dimension: usize,
}

/// Errors from persisting or loading an index.
///
/// `NotFound` is the expected first-run outcome; everything else indicates
/// either an I/O problem or a damaged/mismatched artifact pair.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vectors file version {0} is newer than supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("checksum mismatch: vectors file may be corrupted")]
    ChecksumMismatch,

    #[error("persisted index was built with a different embedding model")]
    ModelMismatch,

    #[error("unknown metric tag {0} in vectors file")]
    UnknownMetric(u8),

    #[error("malformed manifest: {0}")]
    MalformedManifest(#[from] serde_json::Error),

    #[error("manifest/vector mismatch: {0}")]
    ManifestMismatch(String),

    #[error("vectors file is truncated")]
    Truncated,
}

/// Storage manager for one index directory.
pub struct IndexStorage {
    dir: PathBuf,
}

impl IndexStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when both artifacts are present.
    pub fn exists(&self) -> bool {
        self.dir.join(VECTORS_FILE).exists() && self.dir.join(MANIFEST_FILE).exists()
    }

    /// Persist the vector structure and its manifest as one unit.
    pub fn save(
        &self,
        index: &FlatIndex,
        manifest: &Manifest,
        model_id: &[u8; 32],
    ) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;

        let vectors_path = self.dir.join(VECTORS_FILE);
        let manifest_path = self.dir.join(MANIFEST_FILE);
        let vectors_tmp = vectors_path.with_extension("bin.tmp");
        let manifest_tmp = manifest_path.with_extension("json.tmp");

        let result = self.write_vectors(&vectors_tmp, index, model_id).and_then(|_| {
            let data = serde_json::to_vec_pretty(manifest)?;
            std::fs::write(&manifest_tmp, data).map_err(Into::into)
        });

        if let Err(err) = result {
            let _ = std::fs::remove_file(&vectors_tmp);
            let _ = std::fs::remove_file(&manifest_tmp);
            return Err(err);
        }

        // Vectors land first; a reader pairing old vectors with the old
        // manifest stays consistent until both renames complete.
        std::fs::rename(&vectors_tmp, &vectors_path)?;
        std::fs::rename(&manifest_tmp, &manifest_path)?;

        log::info!(
            "index saved to {:?} ({} documents, {}D)",
            self.dir,
            manifest.total_documents,
            manifest.embedding_dimension
        );
        Ok(())
    }

    /// Load the persisted pair.
    ///
    /// Returns `Ok(None)` when the artifacts are absent (first run). Any
    /// other failure (corruption, model mismatch, desynchronized pair)
    /// is an error; the caller leaves the index unset and rebuilds.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
    ) -> Result<Option<(FlatIndex, Manifest)>, StorageError> {
        if !self.exists() {
            return Ok(None);
        }

        let (index, header) = self.read_vectors(expected_model_id)?;

        let manifest_raw = std::fs::read(self.dir.join(MANIFEST_FILE))?;
        let manifest: Manifest = serde_json::from_slice(&manifest_raw)?;

        if manifest.id_map.len() != header.row_count as usize {
            return Err(StorageError::ManifestMismatch(format!(
                "manifest lists {} ids, vectors file holds {} rows",
                manifest.id_map.len(),
                header.row_count
            )));
        }
        if manifest.total_documents != header.row_count as usize {
            return Err(StorageError::ManifestMismatch(format!(
                "manifest total_documents {} != vector rows {}",
                manifest.total_documents, header.row_count
            )));
        }
        if manifest.embedding_dimension != header.dimensions as usize {
            return Err(StorageError::ManifestMismatch(format!(
                "manifest dimension {} != vectors dimension {}",
                manifest.embedding_dimension, header.dimensions
            )));
        }

        log::info!(
            "index loaded from {:?} ({} documents)",
            self.dir,
            manifest.total_documents
        );
        Ok(Some((index, manifest)))
    }

    /// Remove both artifacts if present.
    pub fn delete(&self) -> Result<(), StorageError> {
        for name in [VECTORS_FILE, MANIFEST_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn write_vectors(
        &self,
        path: &Path,
        index: &FlatIndex,
        model_id: &[u8; 32],
    ) -> Result<(), StorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let mut header = [0u8; HEADER_SIZE];
        header[0] = FORMAT_VERSION;
        header[1..33].copy_from_slice(model_id);
        header[33] = index.metric().tag();
        header[34..36].copy_from_slice(&(index.dimensions() as u16).to_le_bytes());
        header[36..44].copy_from_slice(&(index.len() as u64).to_le_bytes());
        let checksum = crc32fast::hash(&header[0..44]);
        header[44..48].copy_from_slice(&checksum.to_le_bytes());
        writer.write_all(&header)?;

        for value in index.raw() {
            writer.write_all(&value.to_le_bytes())?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_vectors(
        &self,
        expected_model_id: &[u8; 32],
    ) -> Result<(FlatIndex, Header), StorageError> {
        let file = File::open(self.dir.join(VECTORS_FILE))?;
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header_bytes)
            .map_err(|_| StorageError::Truncated)?;

        let version = header_bytes[0];
        if version > FORMAT_VERSION {
            return Err(StorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes(header_bytes[44..48].try_into().expect("4 bytes"));
        if stored_checksum != crc32fast::hash(&header_bytes[0..44]) {
            return Err(StorageError::ChecksumMismatch);
        }

        if header_bytes[1..33] != expected_model_id[..] {
            return Err(StorageError::ModelMismatch);
        }

        let metric =
            Metric::from_tag(header_bytes[33]).ok_or(StorageError::UnknownMetric(header_bytes[33]))?;
        let dimensions = u16::from_le_bytes(header_bytes[34..36].try_into().expect("2 bytes")) as usize;
        let row_count = u64::from_le_bytes(header_bytes[36..44].try_into().expect("8 bytes"));

        if dimensions == 0 {
            return Err(StorageError::ManifestMismatch(
                "vectors file declares zero dimensions".to_string(),
            ));
        }

        let value_count = (row_count as usize)
            .checked_mul(dimensions)
            .ok_or(StorageError::Truncated)?;
        let mut data = Vec::with_capacity(value_count);
        let mut buf = [0u8; 4];
        for _ in 0..value_count {
            reader.read_exact(&mut buf).map_err(|_| StorageError::Truncated)?;
            data.push(f32::from_le_bytes(buf));
        }

        let index = FlatIndex::from_raw(dimensions, metric, data).map_err(|e| {
            StorageError::ManifestMismatch(format!("vector data inconsistent: {e}"))
        })?;

        let header = Header {
            dimensions: dimensions as u16,
            row_count,
        };
        Ok((index, header))
    }
}

struct Header {
    dimensions: u16,
    row_count: u64,
}
