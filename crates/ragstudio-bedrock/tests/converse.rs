//! Integration tests against real Bedrock endpoints.
//!
//! These need AWS credentials with Bedrock access in the environment.
//!
//! Run with: `cargo test -p ragstudio-bedrock --test converse -- --ignored`

use ragstudio_bedrock::builder::BedrockModelBuilder;
use ragstudio_core::models::chat::ChatMessage;
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_runtime::builder::{ModelBuilder, ModelCache};
use ragstudio_runtime::negotiate::{NegotiationPolicy, negotiate};
use ragstudio_runtime::resources::ResourceSnapshot;

async fn builder() -> (BedrockModelBuilder, tempfile::TempDir) {
    let cache = tempfile::tempdir().unwrap();
    let builder = BedrockModelBuilder::from_env(Some("us-east-1"), ModelCache::new(cache.path())).await;
    (builder, cache)
}

#[tokio::test]
#[ignore]
async fn chat_round_trip() {
    let (builder, _cache) = builder().await;
    let model = "us.anthropic.claude-3-5-haiku-20241022-v1:0";
    let profile = builder.describe(model).await.unwrap();
    let config = negotiate(&profile, &ResourceSnapshot::default(), &NegotiationPolicy::default()).unwrap();
    let llm = builder.make_generation_model(model, &config).await.unwrap();

    let sampling = SamplingParams {
        temperature: Some(0.0),
        max_tokens: Some(16),
        ..SamplingParams::default()
    };
    let reply = llm
        .chat(
            &[
                ChatMessage::system("Answer with a single word."),
                ChatMessage::user("What colour is the sky on a clear day?"),
            ],
            &sampling,
        )
        .await
        .unwrap();
    println!("reply: {reply}");
    assert!(!reply.trim().is_empty());
}

#[tokio::test]
#[ignore]
async fn titan_embeddings_have_catalog_dims() {
    let (builder, _cache) = builder().await;
    let embed = builder
        .make_embedding_model("BAAI/bge-large-en-v1.5")
        .await
        .unwrap();

    let vectors = embed
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert!(vectors.iter().all(|v| v.len() == embed.dims()));
}
