//! Flat in-memory vector index.
//!
//! Vectors are stored row-major in insertion order; a query scans every row
//! and returns the k nearest positions. Positions are the join key to the
//! id manifest kept by the store; the index itself knows nothing about
//! chunk ids.

/// Distance variant for a flat index.
///
/// The variant is fixed at configuration time and persisted alongside the
/// vectors; the relevance transform used downstream depends on it, so the
/// two must never be mixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    /// Squared Euclidean distance (monotone in Euclidean, no sqrt per row).
    /// Unbounded above; relevance is `1 / (1 + d)`.
    L2,
    /// `1 - max(0, cosine)`: a normalized dissimilarity in [0, 1].
    /// Relevance is `1 - d`.
    Cosine,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::L2 => "flat-l2",
            Metric::Cosine => "flat-cosine",
        }
    }

    /// Parse a config string ("flat-l2" / "flat-cosine").
    pub fn parse(s: &str) -> Option<Metric> {
        match s {
            "flat-l2" => Some(Metric::L2),
            "flat-cosine" => Some(Metric::Cosine),
            _ => None,
        }
    }

    /// Single-byte tag used in the persisted header.
    pub fn tag(&self) -> u8 {
        match self {
            Metric::L2 => 0,
            Metric::Cosine => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Metric> {
        match tag {
            0 => Some(Metric::L2),
            1 => Some(Metric::Cosine),
            _ => None,
        }
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            Metric::Cosine => {
                let sim = super::embeddings::cosine_similarity(a, b);
                1.0 - sim.max(0.0)
            }
        }
    }

    /// Map a distance to a higher-is-better score trending toward 1 for a
    /// perfect match and toward 0 for distant ones.
    pub fn relevance(&self, distance: f32) -> f32 {
        match self {
            Metric::L2 => 1.0 / (1.0 + distance),
            Metric::Cosine => 1.0 - distance,
        }
    }
}

/// Errors from index construction and queries.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding dimension must be non-zero")]
    ZeroDimension,

    #[error("dimension mismatch: index holds {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Append-only flat vector collection over one metric.
///
/// Built once per corpus snapshot and replaced wholesale on rebuild;
/// queries are read-only and safe to share across threads.
pub struct FlatIndex {
    dimensions: usize,
    metric: Metric,
    /// Row-major vector data, one row per document position.
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimensions: usize, metric: Metric) -> Result<Self, IndexError> {
        if dimensions == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimensions,
            metric,
            data: Vec::new(),
        })
    }

    pub fn with_capacity(
        dimensions: usize,
        metric: Metric,
        rows: usize,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new(dimensions, metric)?;
        index.data.reserve(rows * dimensions);
        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one vector; its position is the current length.
    pub fn push(&mut self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Borrow the vector at `position`, if in range.
    pub fn row(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// Raw row-major data, for persistence.
    pub(crate) fn raw(&self) -> &[f32] {
        &self.data
    }

    /// Rebuild from raw row-major data, for loading.
    pub(crate) fn from_raw(
        dimensions: usize,
        metric: Metric,
        data: Vec<f32>,
    ) -> Result<Self, IndexError> {
        if dimensions == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if data.len() % dimensions != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                got: data.len() % dimensions,
            });
        }
        Ok(Self {
            dimensions,
            metric,
            data,
        })
    }

    /// k-nearest-neighbor scan.
    ///
    /// Returns `(position, distance)` pairs ordered by ascending distance.
    /// `k` is clamped to the number of indexed vectors; `k == 0` yields an
    /// empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|pos| {
                let row = &self.data[pos * self.dimensions..(pos + 1) * self.dimensions];
                (pos, self.metric.distance(query, row))
            })
            .collect();

        // Ties broken by position so results are deterministic.
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored)
    }
}
