//! Shared stubs for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use medibot_rag::{
    Completion, DistanceMetric, DocumentChunk, EmbeddingProvider, GenerationClient,
    GenerationOptions, PromptPayload, RagError, Result, VectorIndex,
};

/// Bag-of-words embedder over a fixed vocabulary: one dimension per word.
pub struct VocabularyEmbedder {
    vocabulary: Vec<String>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

impl VocabularyEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
            calls: AtomicUsize::new(0),
            delay: None,
            fail: false,
        }
    }

    pub fn medical() -> Self {
        Self::new(&["aspirin", "ibuprofen", "reduces", "fever", "inflammation", "what", "pain"])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let token = token.to_lowercase();
            if let Some(position) = self.vocabulary.iter().position(|w| *w == token) {
                vector[position] += 1.0;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RagError::Embedding {
                provider: "vocabulary".into(),
                message: "embedding service unreachable".into(),
            });
        }
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len()
    }

    fn model_name(&self) -> &str {
        "test-vocabulary"
    }
}

/// Build an index over `texts`, in order, with `embedder`.
pub fn build_index(embedder: &VocabularyEmbedder, texts: &[&str]) -> VectorIndex {
    let mut index = VectorIndex::new(embedder.fingerprint(), DistanceMetric::Cosine);
    for text in texts {
        let chunk = DocumentChunk::new(*text).with_metadata("source", "test.pdf");
        index.insert(embedder.vectorize(text), chunk).unwrap();
    }
    index
}

pub const ASPIRIN: &str = "Aspirin reduces fever.";
pub const IBUPROFEN: &str = "Ibuprofen reduces inflammation.";

/// What a [`StubClient`] does on one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Timeout,
    Backend,
    Auth,
    Hang,
}

/// Scripted generation client. Replays `replies` in order and repeats the
/// last one once the script runs out.
pub struct StubClient {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<PromptPayload>>,
}

impl StubClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        let last = replies.last().cloned().unwrap_or(Reply::Text(String::new()));
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::new(vec![Reply::Text(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<PromptPayload> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for StubClient {
    async fn generate(
        &self,
        prompt: &PromptPayload,
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            replies.pop_front().unwrap_or_else(|| self.last.lock().unwrap().clone())
        };

        match reply {
            Reply::Text(text) => Ok(Completion {
                text,
                model: options.model.clone(),
                usage: None,
                latency: Duration::ZERO,
            }),
            Reply::Timeout => Err(RagError::GenerationTimeout {
                provider: "stub".into(),
                timeout: options.timeout,
            }),
            Reply::Backend => Err(RagError::GenerationBackend {
                provider: "stub".into(),
                status: Some(503),
                message: "overloaded".into(),
            }),
            Reply::Auth => {
                Err(RagError::GenerationAuth { provider: "stub".into(), message: "bad key".into() })
            }
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    fn provider(&self) -> &str {
        "stub"
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
