//! Question-answering orchestrator.
//!
//! The [`RagPipeline`] runs one linear request per call:
//!
//! ```text
//! Start → Retrieving → Assembling → Generating → Done
//! ```
//!
//! Any stage may fail; the first failure ends the request and is returned
//! unchanged, so [`RagError::kind`](crate::RagError::kind) tells the caller
//! which stage broke. The pipeline keeps no state between calls and is meant
//! to be shared behind an `Arc` by concurrent requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use medibot_rag::{RagPipeline, Retriever, GroqClient};
//!
//! let pipeline = RagPipeline::builder()
//!     .retriever(Retriever::new(index, embedder)?)
//!     .generation_client(Arc::new(GroqClient::from_env()?))
//!     .top_k(3)
//!     .build()?;
//!
//! let answer = pipeline.answer("What reduces fever?").await?;
//! println!("{} ({} sources)", answer.text, answer.sources.len());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, error, info, instrument};

use crate::config::{DEFAULT_TIMEOUT_MARGIN, DEFAULT_TOP_K, RagConfig, TimeoutBudget};
use crate::conversation::ConversationLog;
use crate::document::Answer;
use crate::error::{RagError, Result};
use crate::generation::{GenerationClient, GenerationOptions};
use crate::prompt::{PromptConfig, PromptTemplate};
use crate::retriever::Retriever;
use crate::retry::RetryingClient;

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineStage {
    Start = 0,
    Retrieving = 1,
    Assembling = 2,
    Generating = 3,
    Done = 4,
}

impl PipelineStage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineStage::Retrieving,
            2 => PipelineStage::Assembling,
            3 => PipelineStage::Generating,
            4 => PipelineStage::Done,
            _ => PipelineStage::Start,
        }
    }
}

/// Records the current stage so a request cut off by the overall budget can
/// report where it stopped.
struct StageTracker(AtomicU8);

impl StageTracker {
    fn new() -> Self {
        Self(AtomicU8::new(PipelineStage::Start as u8))
    }

    fn enter(&self, stage: PipelineStage) {
        debug!(?stage, "entering stage");
        self.0.store(stage as u8, Ordering::Relaxed);
    }

    fn current(&self) -> PipelineStage {
        PipelineStage::from_u8(self.0.load(Ordering::Relaxed))
    }
}

/// The retrieval-augmented question answering orchestrator.
///
/// Composes a [`Retriever`], a compiled [`PromptTemplate`] and a
/// [`GenerationClient`]. Construct one via [`RagPipeline::builder()`] or
/// [`RagPipeline::from_config`].
pub struct RagPipeline {
    retriever: Retriever,
    template: PromptTemplate,
    generation_client: Arc<dyn GenerationClient>,
    options: GenerationOptions,
    top_k: usize,
    budget: TimeoutBudget,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Build a pipeline from a validated [`RagConfig`].
    ///
    /// Wraps `generation_client` in a [`RetryingClient`] when the config
    /// enables retries.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] or [`RagError::Template`] if the
    /// config is invalid.
    pub fn from_config(
        config: &RagConfig,
        retriever: Retriever,
        generation_client: Arc<dyn GenerationClient>,
    ) -> Result<Self> {
        config.validate()?;
        let generation_client: Arc<dyn GenerationClient> = match &config.retry {
            Some(policy) => Arc::new(RetryingClient::new(generation_client, policy.clone())?),
            None => generation_client,
        };

        Self::builder()
            .retriever(retriever)
            .generation_client(generation_client)
            .prompt(config.prompt.clone())
            .options(config.generation.clone())
            .top_k(config.top_k)
            .budget(config.timeout_budget())
            .build()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn budget(&self) -> TimeoutBudget {
        self.budget
    }

    /// Answer `question` from the indexed context.
    ///
    /// # Errors
    ///
    /// - [`RagError::Retrieval`] if the query could not be embedded or searched
    /// - [`RagError::GenerationAuth`], [`RagError::GenerationTimeout`] or
    ///   [`RagError::GenerationBackend`] if the model call failed
    ///
    /// A request exceeding the overall budget is reported against the stage
    /// it was in.
    #[instrument(
        name = "rag.answer",
        skip_all,
        fields(question_len = question.len(), top_k = self.top_k)
    )]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let tracker = StageTracker::new();
        let total = self.budget.total();

        match tokio::time::timeout(total, self.run(question, &tracker)).await {
            Ok(result) => result,
            Err(_) => {
                let stage = tracker.current();
                error!(?stage, budget = ?total, "request exceeded its overall budget");
                Err(match stage {
                    PipelineStage::Retrieving | PipelineStage::Start => RagError::Retrieval(
                        format!("request exceeded its {total:?} budget while retrieving"),
                    ),
                    _ => RagError::GenerationTimeout {
                        provider: self.generation_client.provider().to_string(),
                        timeout: total,
                    },
                })
            }
        }
    }

    /// Answer `question` and, only on success, append the exchange to `log`.
    ///
    /// A failed request leaves `log` untouched, so retrying is safe.
    pub async fn answer_in(&self, log: &mut ConversationLog, question: &str) -> Result<Answer> {
        let answer = self.answer(question).await?;
        log.push_exchange(question, answer.text.clone());
        Ok(answer)
    }

    async fn run(&self, question: &str, tracker: &StageTracker) -> Result<Answer> {
        // 1. Retrieve
        tracker.enter(PipelineStage::Retrieving);
        let retrieved = self.retriever.retrieve(question, self.top_k).await.map_err(|e| {
            error!(kind = %e.kind(), error = %e, "retrieval failed");
            e
        })?;
        info!(hits = retrieved.len(), "retrieved context");

        // 2. Assemble
        tracker.enter(PipelineStage::Assembling);
        let sources = retrieved.into_chunks();
        let prompt = self.template.render(&sources, question);

        // 3. Generate
        tracker.enter(PipelineStage::Generating);
        let provider = self.generation_client.provider().to_string();
        let completion = match tokio::time::timeout(
            self.budget.generation,
            self.generation_client.generate(&prompt, &self.options),
        )
        .await
        {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => {
                error!(kind = %e.kind(), provider = %provider, error = %e, "generation failed");
                return Err(e);
            }
            Err(_) => {
                let budget = self.budget.generation;
                error!(provider = %provider, ?budget, "generation exceeded its budget");
                return Err(RagError::GenerationTimeout { provider, timeout: budget });
            }
        };

        // 4. Done
        tracker.enter(PipelineStage::Done);
        info!(
            model = %completion.model,
            latency = ?completion.latency,
            total_tokens = completion.usage.map(|u| u.total_tokens),
            sources = sources.len(),
            "answered"
        );

        Ok(Answer { text: completion.text, sources })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `retriever` and `generation_client` are required. Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    retriever: Option<Retriever>,
    generation_client: Option<Arc<dyn GenerationClient>>,
    prompt: Option<PromptConfig>,
    options: Option<GenerationOptions>,
    top_k: Option<usize>,
    budget: Option<TimeoutBudget>,
}

impl RagPipelineBuilder {
    /// Set the retriever.
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the generation backend.
    pub fn generation_client(mut self, client: Arc<dyn GenerationClient>) -> Self {
        self.generation_client = Some(client);
        self
    }

    /// Set the prompt template and grounding instruction.
    pub fn prompt(mut self, prompt: PromptConfig) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Set the generation options.
    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the number of chunks retrieved per question (default 3).
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Set the stage budgets.
    ///
    /// Defaults to the retriever's embedding timeout, the generation options'
    /// timeout and a five second margin.
    pub fn budget(mut self, budget: TimeoutBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if a required field is missing or
    /// an option is invalid, and [`RagError::Template`] if the prompt template
    /// lacks a placeholder.
    pub fn build(self) -> Result<RagPipeline> {
        let retriever = self
            .retriever
            .ok_or_else(|| RagError::Configuration("retriever is required".to_string()))?;
        let generation_client = self
            .generation_client
            .ok_or_else(|| RagError::Configuration("generation_client is required".to_string()))?;

        let template = PromptTemplate::compile(&self.prompt.unwrap_or_default())?;

        let options = self.options.unwrap_or_default();
        options.validate()?;

        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(RagError::Configuration("top_k must be greater than zero".to_string()));
        }

        let budget = self.budget.unwrap_or(TimeoutBudget {
            embedding: retriever.embedding_timeout(),
            generation: options.timeout,
            margin: DEFAULT_TIMEOUT_MARGIN,
        });
        let retriever = retriever.with_embedding_timeout(budget.embedding);

        Ok(RagPipeline { retriever, template, generation_client, options, top_k, budget })
    }
}
