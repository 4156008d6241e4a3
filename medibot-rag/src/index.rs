//! Read-only vector index with exact nearest-neighbor search.
//!
//! A [`VectorIndex`] holds `(embedding, chunk)` pairs produced by an external
//! index builder, the [`ModelFingerprint`] of the embedding model that built
//! it, and the [`DistanceMetric`] the builder chose. Once loaded it is never
//! mutated; the serving process shares it as an `Arc<VectorIndex>`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::document::{DocumentChunk, RetrievalResult, ScoredChunk};
use crate::embedding::ModelFingerprint;
use crate::error::{RagError, Result};

/// Similarity metric used to rank index entries against a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity; magnitude-independent.
    #[default]
    Cosine,
    /// Raw dot product; equal to cosine for L2-normalized vectors.
    InnerProduct,
}

impl DistanceMetric {
    /// Score `a` against `b`. Higher is more similar.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::InnerProduct => dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// A stored embedding and the chunk it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub embedding: Vec<f32>,
    pub chunk: DocumentChunk,
}

/// An in-memory, read-only collection of embedded chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    fingerprint: ModelFingerprint,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Create an empty index for vectors produced by `fingerprint`'s model.
    pub fn new(fingerprint: ModelFingerprint, metric: DistanceMetric) -> Self {
        Self { fingerprint, metric, entries: Vec::new() }
    }

    /// Build an index from already-embedded entries, validating dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if any entry's embedding length
    /// differs from the fingerprint's dimensions.
    pub fn from_entries(
        fingerprint: ModelFingerprint,
        metric: DistanceMetric,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        let mut index = Self::new(fingerprint, metric);
        index.entries.reserve(entries.len());
        for entry in entries {
            index.insert(entry.embedding, entry.chunk)?;
        }
        Ok(index)
    }

    /// Append an entry. Storage order is preserved and breaks score ties.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] on a dimension mismatch.
    pub fn insert(&mut self, embedding: Vec<f32>, chunk: DocumentChunk) -> Result<()> {
        if embedding.len() != self.fingerprint.dimensions {
            return Err(RagError::Configuration(format!(
                "embedding has {} dimensions, index expects {}",
                embedding.len(),
                self.fingerprint.dimensions
            )));
        }
        self.entries.push(IndexEntry { embedding, chunk });
        Ok(())
    }

    pub fn fingerprint(&self) -> &ModelFingerprint {
        &self.fingerprint
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the `top_k` entries most similar to `query`, best first.
    ///
    /// Every entry is scored (exact search). Entries with equal scores keep
    /// their storage order; NaN scores rank last. If the index holds fewer
    /// than `top_k` entries all of them are returned.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Retrieval`] if `query` has the wrong dimensionality.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<RetrievalResult> {
        if query.len() != self.fingerprint.dimensions {
            return Err(RagError::Retrieval(format!(
                "query embedding has {} dimensions, index '{}' expects {}",
                query.len(),
                self.fingerprint.model,
                self.fingerprint.dimensions
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let score = self.metric.score(&entry.embedding, query);
                (position, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        // `sort_by` is stable, which gives the storage-order tie-break.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        let hits = scored
            .into_iter()
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect();
        Ok(RetrievalResult::new(hits))
    }
}
