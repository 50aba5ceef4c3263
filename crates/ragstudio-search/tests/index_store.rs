mod common;

use std::collections::HashSet;
use std::sync::Arc;

use ragstudio_core::layout;
use ragstudio_core::models::chat::{ChatMessage, ChatRole};
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_core::models::settings::{ChatPrompts, QueryPrompts};
use ragstudio_search::error::SearchError;
use ragstudio_search::store::KnowledgeIndexStore;
use ragstudio_storage::local::LocalSnapshotRepository;
use ragstudio_storage::repository::SnapshotRepository;

use common::{BrokenEmbedding, NanEmbedding, RecordingLlm, WordBucketEmbedding, write_file};

fn embedder() -> Arc<WordBucketEmbedding> {
    Arc::new(WordBucketEmbedding::new("bucket-embed"))
}

#[test]
fn empty_storage_root_is_fatal() {
    let err = KnowledgeIndexStore::open("", embedder()).err().unwrap();
    assert!(matches!(err, SearchError::EmptyStorageRoot));
}

#[tokio::test]
async fn ingest_lists_documents_in_order() {
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let mut store = KnowledgeIndexStore::open(root.path(), embedder()).unwrap();
    assert!(store.list_documents().is_empty());
    assert!(!store.has_unsaved_changes());

    let essay = write_file(docs.path(), "essay.txt", "Rivers shape valleys.\n\nSlowly.");
    let notes = write_file(docs.path(), "notes.md", "Lists of things.");
    store.ingest(&essay).await.unwrap();
    store.ingest(&notes).await.unwrap();

    assert_eq!(
        store.list_documents(),
        vec![Some("essay.txt".to_string()), Some("notes.md".to_string())]
    );
    assert!(store.has_unsaved_changes());
    assert!(!store.nodes().is_empty());
}

#[tokio::test]
async fn failed_embedding_leaves_index_unchanged() {
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let mut store = KnowledgeIndexStore::open(root.path(), Arc::new(BrokenEmbedding)).unwrap();

    let path = write_file(docs.path(), "essay.txt", "words");
    assert!(matches!(store.ingest(&path).await, Err(SearchError::Model(_))));
    assert!(store.list_documents().is_empty());
    assert!(!store.has_unsaved_changes());
}

#[tokio::test]
async fn nan_embedding_is_refused_and_index_stays_loadable() {
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let mut store = KnowledgeIndexStore::open(root.path(), Arc::new(NanEmbedding)).unwrap();

    let path = write_file(docs.path(), "essay.txt", "words");
    assert!(matches!(
        store.ingest(&path).await,
        Err(SearchError::NonFiniteEmbedding { .. })
    ));
    assert!(store.list_documents().is_empty());
    assert!(store.nodes().is_empty());
    assert!(!store.has_unsaved_changes());

    store.persist_local().unwrap();
    let reopened = KnowledgeIndexStore::open(root.path(), Arc::new(NanEmbedding)).unwrap();
    assert!(reopened.is_empty());
}

#[tokio::test]
async fn checkpoint_then_reopen_from_remote_reproduces_documents() {
    let remote = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let first_root = tempfile::tempdir().unwrap();
    let second_root = tempfile::tempdir().unwrap();
    let repo = LocalSnapshotRepository::new(remote.path());
    repo.create("rag-app").await.unwrap();

    let mut store = KnowledgeIndexStore::open(first_root.path(), embedder()).unwrap();
    for (name, body) in [("essay.txt", "On rivers."), ("b.txt", "On stones.")] {
        store.ingest(&write_file(docs.path(), name, body)).await.unwrap();
    }
    let before: HashSet<_> = store.list_documents().into_iter().collect();

    let commit = store.checkpoint(&repo, "rag-app", "checkpoint").await.unwrap();
    assert!(!store.has_unsaved_changes());
    assert_eq!(store.last_checkpoint(), Some(&commit));
    assert!(layout::index_dir(first_root.path()).join(layout::DOCSTORE_FILE).exists());

    repo.download_folder("rag-app", second_root.path()).await.unwrap();
    let reopened = KnowledgeIndexStore::open(second_root.path(), embedder()).unwrap();
    let after: HashSet<_> = reopened.list_documents().into_iter().collect();
    assert_eq!(before, after);
    assert_eq!(reopened.nodes().len(), store.nodes().len());
}

#[tokio::test]
async fn failed_checkpoint_is_not_recorded() {
    let remote = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let repo = LocalSnapshotRepository::new(remote.path());

    let mut store = KnowledgeIndexStore::open(root.path(), embedder()).unwrap();
    store
        .ingest(&write_file(docs.path(), "essay.txt", "text"))
        .await
        .unwrap();

    // The repository was never created, so the upload fails after the local persist.
    let err = store.checkpoint(&repo, "missing", "checkpoint").await.unwrap_err();
    assert!(matches!(err, SearchError::Storage(_)));
    assert!(store.has_unsaved_changes());
    assert!(store.last_checkpoint().is_none());
}

#[tokio::test]
async fn embedding_model_is_fixed_once_documents_exist() {
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let mut store = KnowledgeIndexStore::open(root.path(), embedder()).unwrap();

    store
        .rebind_embedding_model(Arc::new(WordBucketEmbedding::new("other")))
        .unwrap();
    assert_eq!(store.embed_model().model_name(), "other");

    store
        .ingest(&write_file(docs.path(), "essay.txt", "text"))
        .await
        .unwrap();
    assert!(matches!(
        store.rebind_embedding_model(embedder()),
        Err(SearchError::IndexNotEmpty)
    ));
}

#[tokio::test]
async fn query_against_empty_index_still_answers() {
    let root = tempfile::tempdir().unwrap();
    let store = KnowledgeIndexStore::open(root.path(), embedder()).unwrap();
    let llm = RecordingLlm::default();

    let response = store
        .query_engine(&llm, QueryPrompts::default())
        .query("What is the capital of France?")
        .await
        .unwrap();
    assert_eq!(response.response, "answer 1");
    assert!(response.source_nodes.is_empty());
}

#[tokio::test]
async fn query_refines_over_each_retrieved_node() {
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let mut store = KnowledgeIndexStore::open(root.path(), embedder()).unwrap();
    store
        .ingest(&write_file(docs.path(), "a.txt", "rivers carve valleys"))
        .await
        .unwrap();
    store
        .ingest(&write_file(docs.path(), "b.txt", "glaciers carve fjords"))
        .await
        .unwrap();

    let llm = RecordingLlm::default();
    let prompts = QueryPrompts {
        text_qa_template: "QA [{context_str}] {query_str}".to_string(),
        refine_template: "REFINE [{context_msg}] {existing_answer}".to_string(),
    };
    let response = store
        .query_engine(&llm, prompts)
        .query("what do rivers carve")
        .await
        .unwrap();

    let seen = llm.prompts.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("QA ["));
    assert!(seen[1].starts_with("REFINE ["));
    assert!(seen[1].ends_with("answer 1"));
    assert_eq!(response.response, "answer 2");
    assert_eq!(response.source_nodes.len(), 2);
    assert_eq!(response.source_nodes[0].file_name.as_deref(), Some("a.txt"));
}

#[tokio::test]
async fn chat_condenses_follow_ups_and_sends_context_as_system() {
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let mut store = KnowledgeIndexStore::open(root.path(), embedder()).unwrap();
    store
        .ingest(&write_file(docs.path(), "essay.txt", "rivers carve valleys"))
        .await
        .unwrap();

    let llm = RecordingLlm::default();
    let engine = store.chat_engine(&llm, ChatPrompts::default());

    // No history: no condense step.
    engine.chat("what do rivers carve", &[]).await.unwrap();
    assert!(llm.prompts.lock().unwrap().is_empty());

    let history = vec![
        ChatMessage::user("what do rivers carve"),
        ChatMessage::assistant("valleys"),
    ];
    let response = engine.chat("and how fast?", &history).await.unwrap();
    assert_eq!(response.response, "chat answer");

    let condense = llm.prompts.lock().unwrap().clone();
    assert_eq!(condense.len(), 1);
    assert!(condense[0].contains("user: what do rivers carve"));
    assert!(condense[0].contains("and how fast?"));

    let chats = llm.chats.lock().unwrap().clone();
    let last = chats.last().unwrap();
    assert_eq!(last[0].role, ChatRole::System);
    assert!(last[0].content.contains("rivers carve valleys"));
    assert_eq!(last.len(), 4);
    assert_eq!(last[3], ChatMessage::user("and how fast?"));
}

#[tokio::test]
async fn engines_forward_caller_sampling_to_the_answer() {
    let root = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let mut store = KnowledgeIndexStore::open(root.path(), embedder()).unwrap();
    store
        .ingest(&write_file(docs.path(), "a.txt", "rivers carve valleys"))
        .await
        .unwrap();
    store
        .ingest(&write_file(docs.path(), "b.txt", "rivers carve canyons"))
        .await
        .unwrap();
    let sampling = SamplingParams {
        temperature: Some(0.1),
        max_tokens: Some(64),
        stop: vec!["###".to_string()],
        ..SamplingParams::default()
    };

    let llm = RecordingLlm::default();
    store
        .query_engine(&llm, QueryPrompts::default())
        .with_sampling(sampling.clone())
        .query("what do rivers carve")
        .await
        .unwrap();
    // Text-QA plus one refine, both with the caller's settings.
    assert_eq!(*llm.samplings.lock().unwrap(), vec![sampling.clone(), sampling.clone()]);

    let llm = RecordingLlm::default();
    let history = vec![ChatMessage::user("hello"), ChatMessage::assistant("hi")];
    store
        .chat_engine(&llm, ChatPrompts::default())
        .with_sampling(sampling.clone())
        .chat("what do rivers carve", &history)
        .await
        .unwrap();
    let seen = llm.samplings.lock().unwrap().clone();
    // The condense rewrite runs with model defaults, the answer with the caller's.
    assert_eq!(seen, vec![SamplingParams::default(), sampling]);
}
