use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("repository not found: {repo}")]
    RepoNotFound { repo: String },

    #[error("file {filename} not found in repository {repo}")]
    FileNotFound { repo: String, filename: String },

    #[error("invalid repository name: {0}")]
    InvalidRepoName(String),

    #[error("invalid repository filename: {0}")]
    InvalidFilename(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("S3 GetObject error: {0}")]
    GetObject(String),

    #[error("S3 PutObject error: {0}")]
    PutObject(String),

    #[error("S3 ListObjects error: {0}")]
    ListObjects(String),
}
