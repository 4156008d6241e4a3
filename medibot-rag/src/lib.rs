//! # medibot-rag
//!
//! Grounded question answering over a persisted vector index.
//!
//! A question is embedded, matched against a read-only [`VectorIndex`], and
//! the closest chunks are rendered into a prompt that tells the model to
//! answer only from that context. The model's completion comes back as an
//! [`Answer`] together with the chunks it was conditioned on.
//!
//! ## Components
//!
//! - [`EmbeddingProvider`] – text → vector ([`LocalEmbeddingProvider`] with
//!   `local-embeddings`, [`OpenAIEmbeddingProvider`] with `openai`)
//! - [`VectorIndex`] / [`IndexLoader`] / [`CachedIndex`] – the persisted index
//! - [`Retriever`] – embed the query, return the top-k chunks
//! - [`PromptTemplate`] – validated template, pure rendering
//! - [`GenerationClient`] – [`GroqClient`], wrapped by [`RetryingClient`] if desired
//! - [`RagPipeline`] – the orchestrator
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medibot_rag::{GroqClient, IndexLoader, LocalEmbeddingProvider, RagPipeline, Retriever};
//!
//! let embedder = Arc::new(LocalEmbeddingProvider::new()?);
//! let index = IndexLoader::new("vectorstore/index.json")
//!     .expect_model(embedder.fingerprint())
//!     .load()
//!     .await?;
//!
//! let pipeline = RagPipeline::builder()
//!     .retriever(Retriever::new(Arc::new(index), embedder)?)
//!     .generation_client(Arc::new(GroqClient::from_env()?))
//!     .build()?;
//!
//! let answer = pipeline.answer("What reduces fever?").await?;
//! ```

pub mod config;
pub mod conversation;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod groq;
pub mod index;
pub mod persistence;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod retry;

#[cfg(feature = "local-embeddings")]
pub mod local;
#[cfg(feature = "openai")]
pub mod openai;

pub use config::{RagConfig, RagConfigBuilder, TimeoutBudget};
pub use conversation::{ConversationLog, Role, Turn};
pub use document::{Answer, DocumentChunk, MetadataValue, RetrievalResult, ScoredChunk};
pub use embedding::{EmbeddingProvider, ModelFingerprint};
pub use error::{FailureKind, RagError, Result};
pub use generation::{
    Completion, GenerationClient, GenerationOptions, GenerationOptionsBuilder, TokenUsage,
};
pub use groq::GroqClient;
pub use index::{DistanceMetric, IndexEntry, VectorIndex};
pub use persistence::{CachedIndex, IndexLoader};
pub use pipeline::{PipelineStage, RagPipeline, RagPipelineBuilder};
pub use prompt::{PromptConfig, PromptPayload, PromptTemplate, assemble};
pub use retriever::Retriever;
pub use retry::{RetryPolicy, RetryingClient};

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddingProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
