//! End-to-end tests for the question-answering pipeline with stub backends.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ASPIRIN, IBUPROFEN, Reply, StubClient, VocabularyEmbedder, build_index};
use medibot_rag::{
    ConversationLog, FailureKind, GenerationClient, RagConfig, RagError, RagPipeline, Retriever,
    RetryPolicy, Role, TimeoutBudget,
};

fn retriever(embedder: VocabularyEmbedder) -> Retriever {
    let index = build_index(&VocabularyEmbedder::medical(), &[ASPIRIN, IBUPROFEN]);
    Retriever::new(Arc::new(index), Arc::new(embedder)).unwrap()
}

fn pipeline(client: Arc<StubClient>, top_k: usize) -> RagPipeline {
    RagPipeline::builder()
        .retriever(retriever(VocabularyEmbedder::medical()))
        .generation_client(client)
        .top_k(top_k)
        .build()
        .unwrap()
}

#[tokio::test]
async fn answers_from_the_closest_chunk() {
    let client = Arc::new(StubClient::answering("Aspirin"));
    let pipeline = pipeline(client.clone(), 1);

    let answer = pipeline.answer("What reduces fever?").await.unwrap();

    assert_eq!(answer.text, "Aspirin");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].text, ASPIRIN);

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].body.contains(ASPIRIN));
    assert!(!prompts[0].body.contains(IBUPROFEN));
    assert!(prompts[0].body.contains("What reduces fever?"));
    assert!(prompts[0].instruction.contains("Don't try to make up an answer"));
}

#[tokio::test]
async fn sources_follow_similarity_order() {
    let client = Arc::new(StubClient::answering("Both."));
    let pipeline = pipeline(client.clone(), 3);

    let answer = pipeline.answer("What reduces fever?").await.unwrap();

    let texts: Vec<&str> = answer.sources.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec![ASPIRIN, IBUPROFEN]);
    let body = &client.prompts()[0].body;
    assert!(body.find(ASPIRIN).unwrap() < body.find(IBUPROFEN).unwrap());
}

#[tokio::test]
async fn generation_timeout_surfaces_as_generation_failure() {
    let client = Arc::new(StubClient::new(vec![Reply::Timeout]));
    let pipeline = pipeline(client, 1);
    let mut log = ConversationLog::new();

    let err = pipeline.answer_in(&mut log, "What reduces fever?").await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Generation);
    assert!(matches!(err, RagError::GenerationTimeout { .. }));
    assert!(log.is_empty());
}

#[tokio::test]
async fn auth_failure_is_not_masked() {
    let pipeline = pipeline(Arc::new(StubClient::new(vec![Reply::Auth])), 1);

    let err = pipeline.answer("What reduces fever?").await.unwrap_err();

    assert!(matches!(err, RagError::GenerationAuth { .. }));
}

#[tokio::test]
async fn retrieval_failure_skips_generation() {
    let client = Arc::new(StubClient::answering("unused"));
    let pipeline = RagPipeline::builder()
        .retriever(retriever(VocabularyEmbedder::medical().failing()))
        .generation_client(client.clone())
        .build()
        .unwrap();

    let err = pipeline.answer("What reduces fever?").await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Retrieval);
    assert_eq!(client.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_backend_is_cut_off_by_the_generation_budget() {
    let pipeline = RagPipeline::builder()
        .retriever(retriever(VocabularyEmbedder::medical()))
        .generation_client(Arc::new(StubClient::new(vec![Reply::Hang])))
        .budget(TimeoutBudget {
            embedding: Duration::from_secs(1),
            generation: Duration::from_secs(3),
            margin: Duration::from_secs(1),
        })
        .build()
        .unwrap();

    let err = pipeline.answer("What reduces fever?").await.unwrap_err();

    assert!(matches!(
        err,
        RagError::GenerationTimeout { timeout, .. } if timeout == Duration::from_secs(3)
    ));
}

#[tokio::test(start_paused = true)]
async fn slow_embedding_is_reported_as_retrieval() {
    let client = Arc::new(StubClient::answering("unused"));
    let pipeline = RagPipeline::builder()
        .retriever(retriever(VocabularyEmbedder::medical().with_delay(Duration::from_secs(120))))
        .generation_client(client.clone())
        .budget(TimeoutBudget {
            embedding: Duration::from_secs(2),
            generation: Duration::from_secs(3),
            margin: Duration::from_secs(1),
        })
        .build()
        .unwrap();

    let err = pipeline.answer("What reduces fever?").await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Retrieval);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn successful_answers_are_appended_to_the_log() {
    let client = Arc::new(StubClient::new(vec![
        Reply::Text("Aspirin".into()),
        Reply::Backend,
        Reply::Text("Ibuprofen".into()),
    ]));
    let pipeline = pipeline(client, 1);
    let mut log = ConversationLog::new();

    pipeline.answer_in(&mut log, "What reduces fever?").await.unwrap();
    pipeline.answer_in(&mut log, "What reduces inflammation?").await.unwrap_err();
    pipeline.answer_in(&mut log, "What reduces inflammation?").await.unwrap();

    let turns = log.turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "What reduces fever?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, "Aspirin");
    assert_eq!(turns[3].content, "Ibuprofen");
}

#[tokio::test]
async fn concurrent_requests_share_one_pipeline() {
    let client = Arc::new(StubClient::answering("Aspirin"));
    let pipeline = Arc::new(pipeline(client.clone(), 1));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.answer("What reduces fever?").await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().text, "Aspirin");
    }

    assert_eq!(client.calls(), 8);
}

#[tokio::test(start_paused = true)]
async fn from_config_wraps_the_client_in_retries() {
    let client = Arc::new(StubClient::new(vec![Reply::Backend, Reply::Text("Aspirin".into())]));
    let config = RagConfig::builder()
        .top_k(1)
        .retry(RetryPolicy { max_attempts: 2, ..Default::default() })
        .build()
        .unwrap();
    let generation_client: Arc<dyn GenerationClient> = client.clone();

    let retriever = retriever(VocabularyEmbedder::medical());
    let pipeline = RagPipeline::from_config(&config, retriever, generation_client).unwrap();
    let answer = pipeline.answer("What reduces fever?").await.unwrap();

    assert_eq!(answer.text, "Aspirin");
    assert_eq!(client.calls(), 2);
    assert_eq!(pipeline.budget(), config.timeout_budget());
}

#[test]
fn builder_requires_a_generation_client() {
    let result =
        RagPipeline::builder().retriever(retriever(VocabularyEmbedder::medical())).build();

    assert!(matches!(result, Err(RagError::Configuration(_))));
}

#[test]
fn builder_rejects_zero_top_k() {
    let result = RagPipeline::builder()
        .retriever(retriever(VocabularyEmbedder::medical()))
        .generation_client(Arc::new(StubClient::answering("x")))
        .top_k(0)
        .build();

    assert!(matches!(result, Err(RagError::Configuration(_))));
}

#[test]
fn from_config_rejects_an_oversized_generation_timeout() {
    let config: RagConfig = serde_json::from_str(
        r#"{"generation":{"timeout":1e19},"retry":{"max_attempts":3}}"#,
    )
    .unwrap();
    let generation_client: Arc<dyn GenerationClient> = Arc::new(StubClient::answering("x"));

    let retriever = retriever(VocabularyEmbedder::medical());
    let result = RagPipeline::from_config(&config, retriever, generation_client);

    assert!(matches!(result, Err(RagError::Configuration(_))));
}

#[tokio::test]
async fn saturated_budget_still_answers() {
    let pipeline = RagPipeline::builder()
        .retriever(retriever(VocabularyEmbedder::medical()))
        .generation_client(Arc::new(StubClient::answering("Aspirin")))
        .budget(TimeoutBudget {
            embedding: Duration::MAX,
            generation: Duration::MAX,
            margin: Duration::MAX,
        })
        .build()
        .unwrap();

    let answer = pipeline.answer("What reduces fever?").await.unwrap();

    assert_eq!(answer.text, "Aspirin");
}
