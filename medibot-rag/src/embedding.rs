//! The embedding seam and the fingerprint that ties an index to its model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity of the embedding model that produced a set of vectors.
///
/// An index is only meaningful when queried with vectors from the same model,
/// so the fingerprint is persisted alongside the index and compared on load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelFingerprint {
    /// Model name, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub model: String,
    /// Length of every vector the model produces.
    pub dimensions: usize,
}

impl ModelFingerprint {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self { model: model.into(), dimensions }
    }
}

impl std::fmt::Display for ModelFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} dims)", self.model, self.dimensions)
    }
}

/// Turns text into vectors for similarity search.
///
/// The query side of retrieval must use the same model the index was built
/// with; [`fingerprint`](EmbeddingProvider::fingerprint) is what gets compared.
///
/// ```rust,ignore
/// let embedding = provider.embed("What reduces fever?").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, in order. Sequential unless the backend batches.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;

    /// Identity recorded in indexes built with this provider.
    fn fingerprint(&self) -> ModelFingerprint {
        ModelFingerprint::new(self.model_name(), self.dimensions())
    }
}
