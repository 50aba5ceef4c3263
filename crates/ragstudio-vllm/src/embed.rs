use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragstudio_core::error::ModelError;
use ragstudio_core::runtime::EmbeddingModel;

use crate::chat::post_json;
use crate::error::VllmError;
use crate::server::ServerProcess;

#[derive(Debug, Serialize)]
pub struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Vectors in input order. The server may return them in any order.
pub fn parse_embedding_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>, VllmError> {
    let mut response: EmbeddingResponse = serde_json::from_str(body)?;
    if response.data.len() != expected {
        return Err(VllmError::ResponseParse(format!(
            "{} embeddings for {expected} inputs",
            response.data.len()
        )));
    }
    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

/// The `hidden_size` of a model's `config.json`, which is the width of its
/// pooled embeddings.
pub fn embedding_dims(config_json: &str) -> Result<usize, VllmError> {
    #[derive(Deserialize)]
    struct Dims {
        hidden_size: usize,
    }
    Ok(serde_json::from_str::<Dims>(config_json)?.hidden_size)
}

/// Embedding model served by a local vLLM server started with `--task embed`.
pub struct VllmEmbedding {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    _server: ServerProcess,
}

impl VllmEmbedding {
    pub fn new(http: reqwest::Client, server: ServerProcess, model: impl Into<String>, dims: usize) -> Self {
        Self {
            http,
            base_url: server.base_url().to_string(),
            model: model.into(),
            dims,
            _server: server,
        }
    }
}

#[async_trait]
impl EmbeddingModel for VllmEmbedding {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch = texts.len(), "embedding request");
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let text = post_json(&self.http, &format!("{}/v1/embeddings", self.base_url), &body).await?;
        let vectors = parse_embedding_response(&text, texts.len())?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(ModelError::DimensionMismatch {
                expected: self.dims,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_come_back_in_input_order() {
        let body = r#"{"object": "list", "data": [
            {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
            {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
        ]}"#;
        let vectors = parse_embedding_response(body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn short_batches_are_an_error() {
        let body = r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#;
        assert!(matches!(
            parse_embedding_response(body, 2),
            Err(VllmError::ResponseParse(_))
        ));
    }

    #[test]
    fn dims_from_config() {
        assert_eq!(embedding_dims(r#"{"hidden_size": 1024, "num_hidden_layers": 24}"#).unwrap(), 1024);
        assert!(embedding_dims(r#"{"num_hidden_layers": 24}"#).is_err());
    }
}
