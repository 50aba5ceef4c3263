use thiserror::Error;

use ragstudio_core::error::ModelError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("resource probe failed: {0}")]
    Probe(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("invalid model profile for {model}: {reason}")]
    InvalidProfile { model: String, reason: String },

    #[error(
        "{model} needs {required_bytes} bytes for weights and activations but only {budget_bytes} are usable"
    )]
    InsufficientMemory {
        model: String,
        required_bytes: u64,
        budget_bytes: u64,
    },

    #[error("{model} fits only {max_len} tokens of context, below the minimum of {min_len}")]
    ContextTooSmall {
        model: String,
        max_len: u32,
        min_len: u32,
    },

    #[error("model construction failed for {model}: {reason}")]
    Build { model: String, reason: String },

    #[error("model manager is not initialized")]
    NotInitialized,

    #[error("model manager is already initialized")]
    AlreadyInitialized,

    #[error("no generation model is loaded")]
    NoGenerationModel,

    #[error("no embedding model is loaded")]
    NoEmbeddingModel,

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
