#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;

use ragstudio_core::error::ModelError;
use ragstudio_core::models::chat::ChatMessage;
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_core::runtime::{EmbeddingModel, GenerationModel, ModelParams, Precision};

/// Bag-of-words embedding: each word bumps one bucket chosen by its bytes.
pub struct WordBucketEmbedding {
    pub name: String,
    pub dims: usize,
}

impl WordBucketEmbedding {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dims: 16,
        }
    }
}

#[async_trait]
impl EmbeddingModel for WordBucketEmbedding {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dims];
                for word in text.split_whitespace() {
                    let word = word.to_lowercase();
                    let bucket = word.bytes().map(usize::from).sum::<usize>() % self.dims;
                    v[bucket] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Embedding model that always fails.
pub struct BrokenEmbedding;

#[async_trait]
impl EmbeddingModel for BrokenEmbedding {
    fn model_name(&self) -> &str {
        "broken"
    }

    fn dims(&self) -> usize {
        16
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Err(ModelError::Invocation("offline".to_string()))
    }
}

/// Embedding model whose vectors hold a NaN component.
pub struct NanEmbedding;

#[async_trait]
impl EmbeddingModel for NanEmbedding {
    fn model_name(&self) -> &str {
        "nan"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|_| vec![f32::NAN, 1.0]).collect())
    }
}

/// Generation model that records every prompt it sees.
#[derive(Default)]
pub struct RecordingLlm {
    pub prompts: Mutex<Vec<String>>,
    pub chats: Mutex<Vec<Vec<ChatMessage>>>,
    pub samplings: Mutex<Vec<SamplingParams>>,
}

#[async_trait]
impl GenerationModel for RecordingLlm {
    fn model_name(&self) -> &str {
        "recording"
    }

    fn params(&self) -> ModelParams {
        ModelParams {
            precision: Precision::Float16,
            max_context_len: 4096,
            tensor_parallel: 1,
        }
    }

    async fn complete(&self, prompt: &str, sampling: &SamplingParams) -> Result<String, ModelError> {
        self.samplings.lock().unwrap().push(sampling.clone());
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        Ok(format!("answer {}", prompts.len()))
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, ModelError> {
        self.samplings.lock().unwrap().push(sampling.clone());
        self.chats.lock().unwrap().push(messages.to_vec());
        Ok("chat answer".to_string())
    }
}

pub fn write_file(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}
