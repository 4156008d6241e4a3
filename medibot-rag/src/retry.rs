//! Bounded retry decorator for [`GenerationClient`]s.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};
use crate::generation::{Completion, GenerationClient, GenerationOptions};
use crate::prompt::PromptPayload;

/// How many times, and how patiently, to retry a transient failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retrying.
    pub max_attempts: u32,
    #[serde(with = "crate::generation::duration_secs")]
    pub initial_backoff: Duration,
    #[serde(with = "crate::generation::duration_secs")]
    pub max_backoff: Duration,
    /// Factor applied to the backoff after every failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let secs = self.initial_backoff.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_backoff).min(self.max_backoff)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RagError::Configuration("max_attempts must be at least 1".to_string()));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(RagError::Configuration(format!(
                "multiplier must be a finite number >= 1, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Retries timeouts and backend errors with exponential backoff.
///
/// Auth and configuration failures are returned immediately; repeating them
/// cannot help.
#[derive(Debug, Clone)]
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: GenerationClient> RetryingClient<C> {
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the policy is invalid.
    pub fn new(inner: C, policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { inner, policy })
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<C: GenerationClient> GenerationClient for RetryingClient<C> {
    async fn generate(
        &self,
        prompt: &PromptPayload,
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let mut attempt = 1;
        loop {
            match self.inner.generate(prompt, options).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        provider = self.inner.provider(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        ?backoff,
                        error = %e,
                        "generation failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }
}
