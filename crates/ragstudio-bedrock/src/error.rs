use thiserror::Error;

use ragstudio_core::error::ModelError;
use ragstudio_runtime::error::RuntimeError;

#[derive(Debug, Error)]
pub enum BedrockError {
    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model not supported: {0}")]
    UnsupportedModel(String),
}

impl From<BedrockError> for ModelError {
    fn from(err: BedrockError) -> Self {
        match err {
            BedrockError::ResponseParse(msg) => ModelError::ResponseParse(msg),
            BedrockError::Serialization(e) => ModelError::ResponseParse(e.to_string()),
            other => ModelError::Invocation(other.to_string()),
        }
    }
}

impl From<BedrockError> for RuntimeError {
    fn from(err: BedrockError) -> Self {
        match err {
            BedrockError::UnsupportedModel(model) => RuntimeError::UnknownModel(model),
            other => RuntimeError::Model(other.into()),
        }
    }
}
