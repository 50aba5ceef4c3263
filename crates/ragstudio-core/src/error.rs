use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings document at {path} is not valid JSON: {source}")]
    MalformedSettings {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Failure reported by an embedding or generation model handle.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("embedding dimension mismatch (expected {expected}, got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A sampling request the studio cannot serve.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("only one completion per request is supported, got n={0}")]
    MultipleCompletions(u32),

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}
