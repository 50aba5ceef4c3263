//! Model metadata from a Hugging Face compatible hub.

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use tracing::{debug, info};

use crate::error::VllmError;

pub const CONFIG_FILE: &str = "config.json";

/// Fetches `config.json` files and keeps them next to the model's weights.
#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HubClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            token,
        }
    }

    /// Contents of `<cache_dir>/<model>/config.json`, downloading it first
    /// when it is not cached yet.
    pub async fn model_config(&self, cache_dir: &Path, model: &str) -> Result<String, VllmError> {
        let path = config_path(cache_dir, model);
        if path.exists() {
            debug!(model, path = %path.display(), "model config cached");
            return Ok(std::fs::read_to_string(&path)?);
        }

        let url = config_url(&self.endpoint, model);
        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::UNAUTHORIZED {
            return Err(VllmError::UnknownModel(model.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VllmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let contents = response.text().await?;
        // Reject anything that is not JSON before it lands in the cache.
        serde_json::from_str::<serde_json::Value>(&contents)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &contents)?;
        info!(model, path = %path.display(), "model config downloaded");
        Ok(contents)
    }
}

pub fn config_path(cache_dir: &Path, model: &str) -> PathBuf {
    cache_dir.join(model).join(CONFIG_FILE)
}

pub fn config_url(endpoint: &str, model: &str) -> String {
    format!("{}/{model}/resolve/main/{CONFIG_FILE}", endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_and_paths() {
        assert_eq!(
            config_url("https://huggingface.co/", "BAAI/bge-small-en-v1.5"),
            "https://huggingface.co/BAAI/bge-small-en-v1.5/resolve/main/config.json"
        );
        assert_eq!(
            config_path(Path::new("/models/generation-models"), "mistralai/Mistral-7B"),
            PathBuf::from("/models/generation-models/mistralai/Mistral-7B/config.json")
        );
    }

    #[tokio::test]
    async fn cached_config_is_read_without_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path(), "org/model");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"hidden_size": 8}"#).unwrap();

        // Nothing listens on this endpoint.
        let hub = HubClient::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        let contents = hub.model_config(dir.path(), "org/model").await.unwrap();
        assert_eq!(contents, r#"{"hidden_size": 8}"#);
    }
}
