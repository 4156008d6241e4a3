//! The `ask`, `chat` and `inspect` commands.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use medibot_rag::groq::GROQ_API_KEY_ENV;
use medibot_rag::{
    Answer, ConversationLog, DocumentChunk, EmbeddingProvider, FailureKind, GenerationClient,
    GroqClient, IndexLoader, RagError, RagPipeline, Retriever,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::info;

use crate::config::{EmbeddingBackend, EmbeddingConfig, LauncherConfig};

const SNIPPET_CHARS: usize = 80;

/// Build the query embedder named in the config.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => Ok(Arc::new(medibot_rag::LocalEmbeddingProvider::new()?)),
        #[cfg(feature = "openai")]
        EmbeddingBackend::OpenAI => {
            let mut provider = medibot_rag::OpenAIEmbeddingProvider::from_env()?;
            if let Some(model) = &config.model {
                provider = provider.with_model(model);
            }
            if let Some(dimensions) = config.dimensions {
                provider = provider.with_dimensions(dimensions);
            }
            Ok(Arc::new(provider))
        }
        #[allow(unreachable_patterns)]
        other => bail!("embedding provider {other:?} is not compiled into this build"),
    }
}

/// Load the index, check it against the embedder, and wire up the pipeline.
///
/// The Groq key is read from `GROQ_API_KEY`.
pub async fn build_pipeline(config: &LauncherConfig) -> Result<RagPipeline> {
    build_pipeline_with_key(config, std::env::var(GROQ_API_KEY_ENV).ok()).await
}

/// Like [`build_pipeline`] with an explicit Groq key.
///
/// The generation client is built before the embedder and the index, so a
/// missing key fails without downloading a model or reading the index.
pub async fn build_pipeline_with_key(
    config: &LauncherConfig,
    api_key: Option<String>,
) -> Result<RagPipeline> {
    let client = generation_client(config, api_key)?;

    let embedder = build_embedder(&config.embedding)?;
    let index = IndexLoader::new(&config.rag.index_path)
        .expect_model(embedder.fingerprint())
        .load()
        .await?;
    let retriever = Retriever::new(Arc::new(index), embedder)?;

    let pipeline = RagPipeline::from_config(&config.rag, retriever, client)?;
    info!(
        index = %config.rag.index_path.display(),
        top_k = pipeline.top_k(),
        model = %pipeline.options().model,
        "pipeline ready"
    );
    Ok(pipeline)
}

fn generation_client(
    config: &LauncherConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn GenerationClient>, RagError> {
    let api_key = api_key.ok_or_else(|| {
        RagError::Configuration(format!("{GROQ_API_KEY_ENV} environment variable not set"))
    })?;
    let mut groq = GroqClient::new(api_key)?;
    if let Some(base_url) = &config.generation_base_url {
        groq = groq.with_base_url(base_url);
    }
    Ok(Arc::new(groq))
}

/// Answer one question and print it to `out`.
pub async fn ask(
    pipeline: &RagPipeline,
    question: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("the question is empty");
    }

    let answer = pipeline.answer(question).await?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&answer)?)?;
    } else {
        write!(out, "{}", render_answer(&answer))?;
    }
    Ok(())
}

/// Interactive session. Failed questions are reported and the session goes on.
pub async fn chat(pipeline: &RagPipeline) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to open the terminal")?;
    let mut log = ConversationLog::new();
    println!("Ask a medical question. Ctrl-D to quit.");

    loop {
        let line = match editor.readline("you> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }
        let _ = editor.add_history_entry(question);

        match pipeline.answer_in(&mut log, question).await {
            Ok(answer) => print!("{}", render_answer(&answer)),
            Err(e) => eprintln!("{}", render_failure(&anyhow::Error::from(e))),
        }
    }

    info!(turns = log.len(), "chat session ended");
    Ok(())
}

/// Print what the configured index contains without loading any model.
pub async fn inspect(config: &LauncherConfig, out: &mut impl Write) -> Result<()> {
    let index = IndexLoader::new(&config.rag.index_path).load().await?;

    let sources: BTreeSet<String> = index
        .entries()
        .iter()
        .filter_map(|entry| entry.chunk.metadata.get("source").map(|s| s.to_string()))
        .collect();

    writeln!(out, "index:      {}", config.rag.index_path.display())?;
    writeln!(out, "model:      {}", index.fingerprint())?;
    writeln!(out, "metric:     {:?}", index.metric())?;
    writeln!(out, "chunks:     {}", index.len())?;
    writeln!(out, "documents:  {}", sources.len())?;
    for source in &sources {
        writeln!(out, "  - {source}")?;
    }
    Ok(())
}

/// Human-readable answer followed by its numbered sources.
pub fn render_answer(answer: &Answer) -> String {
    let mut rendered = format!("{}\n", answer.text.trim());
    if !answer.sources.is_empty() {
        rendered.push_str("\nSources:\n");
        for (i, chunk) in answer.sources.iter().enumerate() {
            rendered.push_str(&format!("  [{}] {}\n", i + 1, describe_source(chunk)));
        }
    }
    rendered
}

fn describe_source(chunk: &DocumentChunk) -> String {
    let origin = match (chunk.metadata.get("source"), chunk.metadata.get("page")) {
        (Some(source), Some(page)) => Some(format!("{source}, page {page}")),
        (Some(source), None) => Some(source.to_string()),
        _ => None,
    };

    let mut snippet: String = chunk.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if snippet.chars().count() > SNIPPET_CHARS {
        snippet = snippet.chars().take(SNIPPET_CHARS).collect::<String>() + "…";
    }

    match origin {
        Some(origin) => format!("{origin}: \"{snippet}\""),
        None => format!("\"{snippet}\""),
    }
}

/// The message shown to the user when a request fails. Never contains a
/// made-up answer.
pub fn render_failure(err: &anyhow::Error) -> String {
    let hint = match err.downcast_ref::<RagError>().map(RagError::kind) {
        Some(FailureKind::Retrieval) | Some(FailureKind::Generation) => {
            match err.downcast_ref::<RagError>() {
                Some(RagError::GenerationAuth { .. }) => "Check that GROQ_API_KEY is valid.",
                _ => "Please try again or rephrase your question.",
            }
        }
        Some(FailureKind::IndexLoad) => "Build the vector index first, or point --index at it.",
        Some(FailureKind::Template) => "Fix the prompt template in your configuration.",
        Some(FailureKind::Configuration) => "Check your configuration and environment.",
        None => "Please try again.",
    };
    format!("I encountered an error: {err:#}\n{hint}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use medibot_rag::{DistanceMetric, ModelFingerprint, VectorIndex};

    use super::*;

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk::new(text).with_metadata("source", "gale.pdf").with_metadata("page", 12i64)
    }

    #[test]
    fn answer_lists_numbered_sources() {
        let answer = Answer {
            text: "Aspirin.\n".into(),
            sources: vec![chunk("Aspirin reduces fever."), DocumentChunk::new("Rest helps.")],
        };

        let rendered = render_answer(&answer);

        assert!(rendered.starts_with("Aspirin.\n\nSources:\n"));
        assert!(rendered.contains("[1] gale.pdf, page 12: \"Aspirin reduces fever.\""));
        assert!(rendered.contains("[2] \"Rest helps.\""));
    }

    #[test]
    fn long_sources_are_shortened() {
        let answer =
            Answer { text: "x".into(), sources: vec![DocumentChunk::new("word ".repeat(100))] };
        let rendered = render_answer(&answer);
        assert!(rendered.contains('…'));
        assert!(rendered.lines().all(|l| l.chars().count() < 100));
    }

    #[test]
    fn answer_without_sources_has_no_sources_block() {
        let answer = Answer { text: "I don't know.".into(), sources: vec![] };
        assert_eq!(render_answer(&answer), "I don't know.\n");
    }

    #[test]
    fn generation_failures_suggest_retrying() {
        let err = anyhow::Error::from(RagError::GenerationTimeout {
            provider: "Groq".into(),
            timeout: Duration::from_secs(30),
        });
        let message = render_failure(&err);
        assert!(message.starts_with("I encountered an error: "));
        assert!(message.ends_with("Please try again or rephrase your question."));
    }

    #[test]
    fn auth_failures_point_at_the_key() {
        let err = anyhow::Error::from(RagError::GenerationAuth {
            provider: "Groq".into(),
            message: "401".into(),
        });
        assert!(render_failure(&err).contains("GROQ_API_KEY"));
    }

    #[test]
    fn missing_index_points_at_the_flag() {
        let err = anyhow::Error::from(RagError::IndexLoad {
            path: "vectorstore/index.json".into(),
            message: "no index found at this location".into(),
        });
        assert!(render_failure(&err).contains("--index"));
    }

    #[tokio::test]
    async fn missing_groq_key_fails_before_the_index_is_read() {
        let mut config = LauncherConfig::default();
        config.rag.index_path = "does/not/exist/index.json".into();
        config.embedding.provider = EmbeddingBackend::OpenAI;
        config.embedding.model = Some("not-a-real-model".into());

        let err = build_pipeline_with_key(&config, None).await.err().unwrap();

        match err.downcast_ref::<RagError>() {
            Some(RagError::Configuration(message)) => {
                assert!(message.contains(GROQ_API_KEY_ENV), "unexpected message: {message}");
            }
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_groq_key_is_a_configuration_error() {
        let mut config = LauncherConfig::default();
        config.rag.index_path = "does/not/exist/index.json".into();

        let err = build_pipeline_with_key(&config, Some("  ".into())).await.err().unwrap();

        assert!(matches!(err.downcast_ref::<RagError>(), Some(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn inspect_summarizes_the_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let mut index = VectorIndex::new(ModelFingerprint::new("m", 2), DistanceMetric::Cosine);
        index.insert(vec![1.0, 0.0], chunk("a")).unwrap();
        index.insert(vec![0.0, 1.0], chunk("b")).unwrap();
        index.save(&path).await.unwrap();

        let mut config = LauncherConfig::default();
        config.rag.index_path = path;
        let mut out = Vec::new();
        inspect(&config, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("model:      m (2 dims)"));
        assert!(text.contains("chunks:     2"));
        assert!(text.contains("documents:  1"));
        assert!(text.contains("  - gale.pdf"));
    }
}
