use thiserror::Error;

use ragstudio_core::error::ModelError;
use ragstudio_runtime::error::RuntimeError;

#[derive(Debug, Error)]
pub enum VllmError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("model not found on the hub: {0}")]
    UnknownModel(String),

    #[error("failed to launch {binary}: {reason}")]
    Launch { binary: String, reason: String },

    #[error("server for {model} exited before becoming ready ({status})")]
    Exited { model: String, status: String },

    #[error("server for {model} was not ready after {waited_secs}s")]
    NotReady { model: String, waited_secs: u64 },

    #[error("server at {base_url} still answers after {waited_secs}s")]
    StillRunning { base_url: String, waited_secs: u64 },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VllmError> for ModelError {
    fn from(err: VllmError) -> Self {
        match err {
            VllmError::ResponseParse(msg) => ModelError::ResponseParse(msg),
            VllmError::Serialization(e) => ModelError::ResponseParse(e.to_string()),
            other => ModelError::Invocation(other.to_string()),
        }
    }
}

impl From<VllmError> for RuntimeError {
    fn from(err: VllmError) -> Self {
        match err {
            VllmError::UnknownModel(model) => RuntimeError::UnknownModel(model),
            VllmError::Runtime(inner) => inner,
            VllmError::Io(e) => RuntimeError::Io(e),
            other => RuntimeError::Model(other.into()),
        }
    }
}
