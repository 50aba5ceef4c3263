//! Model handle interfaces.
//!
//! The forward passes themselves live behind these traits. Concrete
//! handles are produced by a runtime-specific model builder and owned by
//! the lifecycle manager; everything else borrows them.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::models::chat::ChatMessage;
use crate::models::sampling::SamplingParams;

/// Numeric precision a generation model is loaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Float32,
    Float16,
    BFloat16,
}

impl Precision {
    pub const fn bytes(&self) -> u64 {
        match self {
            Precision::Float32 => 4,
            Precision::Float16 | Precision::BFloat16 => 2,
        }
    }

    /// Parse a `torch_dtype` style name.
    pub fn from_dtype_name(name: &str) -> Option<Self> {
        match name {
            "float32" | "fp32" | "f32" => Some(Precision::Float32),
            "float16" | "fp16" | "f16" | "half" => Some(Precision::Float16),
            "bfloat16" | "bf16" => Some(Precision::BFloat16),
            _ => None,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precision::Float32 => "float32",
            Precision::Float16 => "float16",
            Precision::BFloat16 => "bfloat16",
        };
        f.write_str(name)
    }
}

/// Resource parameters a generation handle was constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelParams {
    pub precision: Precision,
    pub max_context_len: u32,
    pub tensor_parallel: u32,
}

/// A constructed embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model identifier, e.g. `"BAAI/bge-large-en-v1.5"`.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ModelError::ResponseParse("no embedding returned".to_string()))
    }
}

/// A constructed generation (chat/completion) model.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    fn model_name(&self) -> &str;

    fn params(&self) -> ModelParams;

    /// Single prompt completion.
    async fn complete(&self, prompt: &str, sampling: &SamplingParams) -> Result<String, ModelError>;

    /// Multi-turn completion. `System` messages carry instructions.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, ModelError>;
}
