//! Query-time retrieval: embed the question, then search the index.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Default budget for a single query embedding.
pub const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a shared [`VectorIndex`] with the provider used to embed queries.
///
/// Cheap to clone; every clone shares the same index and provider.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    embedding_timeout: Duration,
}

impl Retriever {
    /// Pair an index with the provider that will embed queries against it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the provider is not the model the
    /// index was built with.
    pub fn new(
        index: Arc<VectorIndex>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let provided = embedding_provider.fingerprint();
        if &provided != index.fingerprint() {
            return Err(RagError::Configuration(format!(
                "embedding provider {provided} does not match index model {}",
                index.fingerprint()
            )));
        }
        Ok(Self { index, embedding_provider, embedding_timeout: DEFAULT_EMBEDDING_TIMEOUT })
    }

    /// Set the budget for embedding a query.
    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout = timeout;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn embedding_timeout(&self) -> Duration {
        self.embedding_timeout
    }

    /// Return the `k` stored chunks closest to `query`, most similar first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Retrieval`] if `k` is zero, if the embedding
    /// provider fails or exceeds its timeout, or if the search fails.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        if k < 1 {
            return Err(RagError::Retrieval("k must be at least 1".to_string()));
        }

        let embedding =
            match tokio::time::timeout(self.embedding_timeout, self.embedding_provider.embed(query))
                .await
            {
                Ok(Ok(embedding)) => embedding,
                Ok(Err(e)) => {
                    error!(error = %e, "query embedding failed");
                    return Err(RagError::Retrieval(format!("query embedding failed: {e}")));
                }
                Err(_) => {
                    error!(timeout = ?self.embedding_timeout, "query embedding timed out");
                    return Err(RagError::Retrieval(format!(
                        "query embedding timed out after {:?}",
                        self.embedding_timeout
                    )));
                }
            };

        let result = self.index.search(&embedding, k)?;
        let top_score = result.hits().first().map(|h| h.score);
        debug!(k, hits = result.len(), top_score, "retrieved");
        Ok(result)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", self.index.fingerprint())
            .field("entries", &self.index.len())
            .field("embedding_timeout", &self.embedding_timeout)
            .finish()
    }
}
