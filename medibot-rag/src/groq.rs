//! Groq generation client over the OpenAI-compatible chat completions API.
//!
//! Any backend that speaks `POST {base_url}/chat/completions` works; point the
//! client elsewhere with [`GroqClient::with_base_url`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::{Completion, GenerationClient, GenerationOptions, TokenUsage};
use crate::prompt::PromptPayload;

/// Default Groq API base URL.
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Environment variable holding the Groq credential.
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

const PROVIDER: &str = "Groq";

/// A [`GenerationClient`] backed by Groq's chat completions endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use medibot_rag::groq::GroqClient;
///
/// let client = GroqClient::from_env()?;
/// let completion = client.generate(&payload, &GenerationOptions::default()).await?;
/// ```
#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GroqClient {
    /// Create a client with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the key is empty. No network
    /// call is made.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Configuration(format!(
                "{PROVIDER} API key must not be empty (set {GROQ_API_KEY_ENV})"
            )));
        }

        let client = reqwest::Client::builder().build().map_err(|e| {
            RagError::Configuration(format!("failed to build {PROVIDER} HTTP client: {e}"))
        })?;

        Ok(Self { client, api_key, endpoint: endpoint_for(GROQ_API_BASE) })
    }

    /// Create a client using the `GROQ_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(GROQ_API_KEY_ENV).map_err(|_| {
            RagError::Configuration(format!("{GROQ_API_KEY_ENV} environment variable not set"))
        })?;
        Self::new(api_key)
    }

    /// Send requests to another OpenAI-compatible base URL.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.endpoint = endpoint_for(base_url.as_ref());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

fn endpoint_for(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

// Chat completions request/response types

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn transport_error(e: reqwest::Error, options: &GenerationOptions) -> RagError {
    if e.is_timeout() {
        error!(provider = PROVIDER, timeout = ?options.timeout, "request timed out");
        RagError::GenerationTimeout { provider: PROVIDER.into(), timeout: options.timeout }
    } else {
        error!(provider = PROVIDER, error = %e, "request failed");
        RagError::GenerationBackend {
            provider: PROVIDER.into(),
            status: None,
            message: format!("request failed: {e}"),
        }
    }
}

// GenerationClient implementation

#[async_trait]
impl GenerationClient for GroqClient {
    async fn generate(
        &self,
        prompt: &PromptPayload,
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let mut messages = Vec::with_capacity(2);
        if !prompt.instruction.is_empty() {
            messages.push(ChatMessage { role: "system", content: &prompt.instruction });
        }
        messages.push(ChatMessage { role: "user", content: &prompt.body });

        let request_body = ChatRequest {
            model: &options.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
            stream: false,
        };

        debug!(
            provider = PROVIDER,
            model = %options.model,
            prompt_len = prompt.body.len(),
            "sending chat completion"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(options.timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport_error(e, options))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(e, options))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Err(RagError::GenerationAuth {
                    provider: PROVIDER.into(),
                    message: format!("API returned {status}: {detail}"),
                });
            }
            return Err(RagError::GenerationBackend {
                provider: PROVIDER.into(),
                status: Some(status.as_u16()),
                message: detail,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::GenerationBackend {
                provider: PROVIDER.into(),
                status: Some(status.as_u16()),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::GenerationBackend {
                provider: PROVIDER.into(),
                status: Some(status.as_u16()),
                message: "response contained no completion".into(),
            })?;

        let latency = started.elapsed();
        let usage = parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        debug!(provider = PROVIDER, ?latency, ?usage, "chat completion received");

        Ok(Completion {
            text,
            model: parsed.model.unwrap_or_else(|| options.model.clone()),
            usage,
            latency,
        })
    }

    fn provider(&self) -> &str {
        PROVIDER
    }
}
