//! Error types for the `medibot-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while answering a question.
///
/// Every variant maps onto a [`FailureKind`], which is what callers branch on
/// when deciding whether to retry, degrade or report.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing credential, invalid option or mismatched components.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The persisted vector index could not be loaded.
    #[error("Index load error ({path}): {message}")]
    IndexLoad {
        /// Location of the persisted index.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// Query embedding or nearest-neighbor search failed.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// The embedding provider failed.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The prompt template is malformed.
    #[error("Template error: {0}")]
    Template(String),

    /// The generation backend rejected the credential.
    #[error("Generation auth error ({provider}): {message}")]
    GenerationAuth {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend did not answer in time.
    #[error("Generation timed out ({provider}) after {timeout:?}")]
    GenerationTimeout {
        /// The generation backend that timed out.
        provider: String,
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// The generation backend returned an error status or a malformed body.
    #[error("Generation backend error ({provider}{}): {message}", status_suffix(.status))]
    GenerationBackend {
        /// The generation backend that produced the error.
        provider: String,
        /// HTTP status, when the backend answered at all.
        status: Option<u16>,
        /// A description of the failure.
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(", status {s}")).unwrap_or_default()
}

/// The terminal `Failed(kind)` state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Configuration,
    IndexLoad,
    Retrieval,
    Template,
    Generation,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::IndexLoad => "index_load",
            FailureKind::Retrieval => "retrieval",
            FailureKind::Template => "template",
            FailureKind::Generation => "generation",
        };
        f.write_str(name)
    }
}

impl RagError {
    /// The failure kind this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            RagError::Configuration(_) => FailureKind::Configuration,
            RagError::IndexLoad { .. } => FailureKind::IndexLoad,
            RagError::Retrieval(_) | RagError::Embedding { .. } => FailureKind::Retrieval,
            RagError::Template(_) => FailureKind::Template,
            RagError::GenerationAuth { .. }
            | RagError::GenerationTimeout { .. }
            | RagError::GenerationBackend { .. } => FailureKind::Generation,
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Configuration, index, template and auth failures are fatal until an
    /// operator fixes something.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::Retrieval(_)
                | RagError::Embedding { .. }
                | RagError::GenerationTimeout { .. }
                | RagError::GenerationBackend { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
