//! Configuration for the question-answering pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::generation::GenerationOptions;
use crate::prompt::{PromptConfig, PromptTemplate};
use crate::retriever::DEFAULT_EMBEDDING_TIMEOUT;
use crate::retry::RetryPolicy;

pub const DEFAULT_INDEX_PATH: &str = "vectorstore/index.json";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);
/// Upper bound for any single configured timeout.
pub const MAX_STAGE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Per-stage time budgets for one `answer()` call.
///
/// The overall request timeout is the sum of the stage budgets plus a margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    pub embedding: Duration,
    pub generation: Duration,
    pub margin: Duration,
}

impl Default for TimeoutBudget {
    fn default() -> Self {
        Self {
            embedding: DEFAULT_EMBEDDING_TIMEOUT,
            generation: GenerationOptions::default().timeout,
            margin: DEFAULT_TIMEOUT_MARGIN,
        }
    }
}

impl TimeoutBudget {
    /// Sum of the stage budgets and the margin, saturating at `Duration::MAX`.
    pub fn total(&self) -> Duration {
        self.embedding.saturating_add(self.generation).saturating_add(self.margin)
    }
}

/// Configuration parameters for the pipeline.
///
/// Secrets never live here; credentials come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Location of the persisted vector index.
    pub index_path: PathBuf,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    pub prompt: PromptConfig,
    pub generation: GenerationOptions,
    /// Budget for embedding one query.
    #[serde(with = "crate::generation::duration_secs")]
    pub embedding_timeout: Duration,
    /// Slack added on top of the stage budgets.
    #[serde(with = "crate::generation::duration_secs")]
    pub timeout_margin: Duration,
    /// Bounded retries around the generation client. Disabled when absent.
    pub retry: Option<RetryPolicy>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            top_k: DEFAULT_TOP_K,
            prompt: PromptConfig::default(),
            generation: GenerationOptions::default(),
            embedding_timeout: DEFAULT_EMBEDDING_TIMEOUT,
            timeout_margin: DEFAULT_TIMEOUT_MARGIN,
            retry: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check every invariant, including that the prompt template compiles.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] for invalid numbers and
    /// [`RagError::Template`] for a malformed template.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::Configuration("top_k must be greater than zero".to_string()));
        }
        if self.embedding_timeout.is_zero() {
            return Err(RagError::Configuration(
                "embedding_timeout must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("embedding_timeout", self.embedding_timeout),
            ("generation.timeout", self.generation.timeout),
            ("timeout_margin", self.timeout_margin),
        ] {
            if value > MAX_STAGE_TIMEOUT {
                return Err(RagError::Configuration(format!(
                    "{name} must be at most {MAX_STAGE_TIMEOUT:?}, got {value:?}"
                )));
            }
        }
        self.generation.validate()?;
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        PromptTemplate::compile(&self.prompt)?;
        Ok(())
    }

    /// Stage budgets derived from this configuration.
    ///
    /// With retries enabled the generation budget covers every attempt and
    /// every backoff. Saturates rather than overflowing.
    pub fn timeout_budget(&self) -> TimeoutBudget {
        let per_call = self.generation.timeout;
        let generation = match &self.retry {
            Some(policy) => {
                let attempts = policy.max_attempts.max(1);
                let backoffs = (1..attempts)
                    .map(|a| policy.backoff(a))
                    .fold(Duration::ZERO, Duration::saturating_add);
                per_call.saturating_mul(attempts).saturating_add(backoffs)
            }
            None => per_call,
        };
        TimeoutBudget { embedding: self.embedding_timeout, generation, margin: self.timeout_margin }
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = path.into();
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn prompt(mut self, prompt: PromptConfig) -> Self {
        self.config.prompt = prompt;
        self
    }

    pub fn generation(mut self, options: GenerationOptions) -> Self {
        self.config.generation = options;
        self
    }

    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout = timeout;
        self
    }

    pub fn timeout_margin(mut self, margin: Duration) -> Self {
        self.config.timeout_margin = margin;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = Some(policy);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
