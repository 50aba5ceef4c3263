use thiserror::Error;

use ragstudio_core::error::{CoreError, SamplingError};
use ragstudio_runtime::error::RuntimeError;
use ragstudio_search::error::SearchError;
use ragstudio_storage::error::StorageError;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("preferences repository {0} does not exist")]
    PreferencesRepoMissing(String),

    #[error("no active storage repository is set in preferences")]
    NoActiveRepo,

    #[error("this studio is read-only")]
    ReadOnly,

    #[error("cannot change the embedding model after documents have been added")]
    EmbeddingModelLocked,

    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("invalid chat request: {0}")]
    InvalidChat(String),

    #[error("invalid sampling parameters: {0}")]
    Sampling(#[from] SamplingError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
