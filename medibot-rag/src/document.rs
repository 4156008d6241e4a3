//! Data types for stored chunks, retrieval results and answers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar metadata value attached to a [`DocumentChunk`].
///
/// Index builders record things like the source file (`"source"`) and the
/// page number (`"page"`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{v}"),
            MetadataValue::Integer(v) => write!(f, "{v}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// An immutable passage stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    /// The text content of the chunk.
    pub text: String,
    /// Key-value metadata recorded when the index was built.
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl DocumentChunk {
    /// Create a chunk with no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), metadata: BTreeMap::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A retrieved [`DocumentChunk`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: DocumentChunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// The outcome of a top-k search: at most k chunks, most relevant first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub(crate) fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    /// The scored hits, ordered by non-increasing score.
    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    /// Iterate over the retrieved chunks in relevance order.
    pub fn chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.hits.iter().map(|hit| &hit.chunk)
    }

    /// Consume the result, keeping only the chunks.
    pub fn into_chunks(self) -> Vec<DocumentChunk> {
        self.hits.into_iter().map(|hit| hit.chunk).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// The final answer returned to the caller.
///
/// Serializes as `{"text": ..., "sources": [{"text": ..., "metadata": {...}}]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The model's completion text.
    pub text: String,
    /// The chunks the answer was conditioned on, most relevant first.
    pub sources: Vec<DocumentChunk>,
}
