use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use ragstudio_core::error::{CoreError, ModelError};
use ragstudio_storage::error::StorageError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("storage root cannot be empty")]
    EmptyStorageRoot,

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("cannot read {path} as a text document: {reason}")]
    UnsupportedDocument { path: PathBuf, reason: String },

    #[error("index already holds documents; the embedding model cannot change")]
    IndexNotEmpty,

    #[error("embedding model returned {actual} vectors for {expected} nodes")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("embedding for node {node_id} holds a NaN or infinite component")]
    NonFiniteEmbedding { node_id: Uuid },

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
