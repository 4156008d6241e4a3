//! Remote query embeddings over the OpenAI `/embeddings` API.
//!
//! Only compiled with the `openai` feature. Useful when the index was built
//! with an OpenAI model; the fingerprint check rejects any other pairing.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const PROVIDER: &str = "OpenAI";

/// Embeds queries with an OpenAI (or OpenAI-compatible) embeddings model.
///
/// ```rust,ignore
/// let provider = OpenAIEmbeddingProvider::from_env()?
///     .with_model("text-embedding-3-large")
///     .with_dimensions(1024);
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dimensions: usize,
    /// Sent only when the caller asked for truncated vectors.
    requested_dimensions: Option<usize>,
    timeout: Duration,
}

impl OpenAIEmbeddingProvider {
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if `api_key` is blank.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Configuration(format!(
                "{PROVIDER} API key must not be empty (set {OPENAI_API_KEY_ENV})"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: embeddings_endpoint(OPENAI_API_BASE),
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            requested_dimensions: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV).map_err(|_| {
            RagError::Configuration(format!("{OPENAI_API_KEY_ENV} environment variable not set"))
        })?;
        Self::new(api_key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ask the API for vectors of `dims` length. Also changes the fingerprint.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.requested_dimensions = Some(dims);
        self
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.endpoint = embeddings_endpoint(base_url.as_ref());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request(&self, input: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input,
            dimensions: self.requested_dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "embedding request failed");
                if e.is_timeout() {
                    failure(format!("timed out after {:?}", self.timeout))
                } else {
                    failure(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| failure(format!("failed to read body: {e}")))?;
        if !status.is_success() {
            let detail =
                serde_json::from_str::<ApiError>(&text).map(|e| e.error.message).unwrap_or(text);
            error!(provider = PROVIDER, %status, "embedding API error");
            return Err(failure(format!("API returned {status}: {detail}")));
        }

        let mut parsed: EmbeddingsResponse = serde_json::from_str(&text)
            .map_err(|e| failure(format!("failed to parse response: {e}")))?;
        if parsed.data.len() != input.len() {
            return Err(failure(format!(
                "API returned {} embeddings for {} inputs",
                parsed.data.len(),
                input.len()
            )));
        }
        // The API may answer out of order; `index` refers back to `input`.
        parsed.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(failure(format!(
                "expected {}-dimensional vectors, got {}",
                self.dimensions,
                bad.len()
            )));
        }
        Ok(vectors)
    }
}

fn embeddings_endpoint(base_url: &str) -> String {
    format!("{}/embeddings", base_url.trim_end_matches('/'))
}

fn failure(message: impl Into<String>) -> RagError {
    RagError::Embedding { provider: PROVIDER.into(), message: message.into() }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, model = %self.model, text_len = text.len(), "embedding query");
        self.request(&[text]).await?.pop().ok_or_else(|| failure("API returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            provider = PROVIDER,
            model = %self.model,
            batch_size = texts.len(),
            "embedding batch"
        );
        self.request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
