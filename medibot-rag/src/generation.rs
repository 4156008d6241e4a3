//! Generation client trait and the options every backend understands.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::prompt::PromptPayload;

pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationOptions {
    /// Backend model identifier.
    pub model: String,
    /// Sampling randomness in `[0, 1]`; lower is more deterministic.
    pub temperature: f32,
    /// Cap on completion length.
    pub max_output_tokens: u32,
    /// Budget for the network round-trip.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

impl GenerationOptions {
    pub fn builder() -> GenerationOptionsBuilder {
        GenerationOptionsBuilder::default()
    }

    /// Check the invariants the builder enforces.
    ///
    /// Used for options that were deserialized rather than built.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(RagError::Configuration("model must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(RagError::Configuration(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(RagError::Configuration(
                "max_output_tokens must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(RagError::Configuration("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for a validated [`GenerationOptions`].
#[derive(Debug, Clone, Default)]
pub struct GenerationOptionsBuilder {
    options: GenerationOptions,
}

impl GenerationOptionsBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = temperature;
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.options.max_output_tokens = tokens;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if:
    /// - `model` is empty
    /// - `temperature` is outside `[0, 1]` (or NaN)
    /// - `max_output_tokens == 0`
    /// - `timeout` is zero
    pub fn build(self) -> Result<GenerationOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw completion plus whatever metadata the backend returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: Option<TokenUsage>,
    /// Wall-clock time of the round-trip.
    pub latency: Duration,
}

/// A language-model backend.
///
/// Implementations make exactly one backend call per invocation: no caching
/// and no retries. Wrap a client in [`RetryingClient`](crate::RetryingClient)
/// for bounded retries.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Send `prompt` to the backend and return its completion.
    ///
    /// # Errors
    ///
    /// [`RagError::GenerationAuth`], [`RagError::GenerationTimeout`] or
    /// [`RagError::GenerationBackend`].
    async fn generate(&self, prompt: &PromptPayload, options: &GenerationOptions)
    -> Result<Completion>;

    /// Short backend name used in logs and errors.
    fn provider(&self) -> &str;
}

#[async_trait]
impl<T: GenerationClient + ?Sized> GenerationClient for std::sync::Arc<T> {
    async fn generate(
        &self,
        prompt: &PromptPayload,
        options: &GenerationOptions,
    ) -> Result<Completion> {
        (**self).generate(prompt, options).await
    }

    fn provider(&self) -> &str {
        (**self).provider()
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
