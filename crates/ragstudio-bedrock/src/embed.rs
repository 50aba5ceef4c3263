use async_trait::async_trait;
use aws_smithy_types::Blob;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragstudio_core::error::ModelError;
use ragstudio_core::runtime::EmbeddingModel;

use crate::error::BedrockError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequest<'a> {
    input_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    normalize: Option<bool>,
}

#[derive(Deserialize)]
struct TitanResponse {
    embedding: Vec<f32>,
}

/// Titan text embeddings through `InvokeModel`, one request per text.
pub struct TitanEmbedding {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
    dims: usize,
}

impl TitanEmbedding {
    pub fn new(config: &aws_config::SdkConfig, model_id: impl Into<String>, dims: usize) -> Self {
        Self {
            client: aws_sdk_bedrockruntime::Client::new(config),
            model_id: model_id.into(),
            dims,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, BedrockError> {
        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_body(&self.model_id, self.dims, text)?))
            .send()
            .await
            .map_err(|e| BedrockError::Invocation(e.into_service_error().to_string()))?;

        let parsed: TitanResponse = serde_json::from_slice(response.body().as_ref())
            .map_err(|e| BedrockError::ResponseParse(e.to_string()))?;
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingModel for TitanEmbedding {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        debug!(model_id = %self.model_id, texts = texts.len(), "embedding batch");
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let vector = self.embed_one(text).await?;
            if vector.len() != self.dims {
                return Err(ModelError::DimensionMismatch {
                    expected: self.dims,
                    actual: vector.len(),
                });
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

fn request_body(model_id: &str, dims: usize, text: &str) -> Result<Vec<u8>, BedrockError> {
    // Only v2 accepts the dimensions/normalize knobs.
    let v2 = model_id.contains("embed-text-v2");
    let request = TitanRequest {
        input_text: text,
        dimensions: v2.then_some(dims),
        normalize: v2.then_some(true),
    };
    Ok(serde_json::to_vec(&request)?)
}
