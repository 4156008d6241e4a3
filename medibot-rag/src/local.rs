//! In-process embedding provider backed by fastembed (ONNX Runtime).
//!
//! This module is only available when the `local-embeddings` feature is enabled.
//! The default model, `all-MiniLM-L6-v2`, is the sentence-transformers model
//! the medical index is built with.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, error, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

pub const MINILM_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";
const MINILM_DIMENSIONS: usize = 384;

const PROVIDER: &str = "fastembed";

/// An [`EmbeddingProvider`] that runs the model on the local CPU.
///
/// Inference is CPU-bound, so it runs on Tokio's blocking pool.
pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbeddingProvider {
    /// Load `all-MiniLM-L6-v2`, downloading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the model cannot be loaded.
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to load embedding model");
            RagError::Configuration(format!("failed to load {MINILM_MODEL_NAME}: {e}"))
        })?;
        info!(provider = PROVIDER, model = MINILM_MODEL_NAME, "loaded embedding model");

        Ok(Self { model: Arc::new(Mutex::new(model)) })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| RagError::Embedding {
                provider: PROVIDER.into(),
                message: "embedding model lock poisoned".into(),
            })?;
            model.embed(texts, None).map_err(|e| RagError::Embedding {
                provider: PROVIDER.into(),
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| RagError::Embedding {
            provider: PROVIDER.into(),
            message: format!("embedding task failed: {e}"),
        })?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");
        self.run(vec![text.to_string()]).await?.into_iter().next().ok_or_else(|| {
            RagError::Embedding {
                provider: PROVIDER.into(),
                message: "model returned no embedding".into(),
            }
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");
        self.run(texts.iter().map(|t| t.to_string()).collect()).await
    }

    fn dimensions(&self) -> usize {
        MINILM_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        MINILM_MODEL_NAME
    }
}
