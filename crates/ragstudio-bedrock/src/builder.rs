use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use ragstudio_core::runtime::{EmbeddingModel, GenerationModel};
use ragstudio_runtime::builder::{ModelBuilder, ModelCache};
use ragstudio_runtime::error::RuntimeError;
use ragstudio_runtime::negotiate::NegotiatedConfig;
use ragstudio_runtime::profile::ModelProfile;

use crate::catalog;
use crate::chat::BedrockChatModel;
use crate::embed::TitanEmbedding;
use crate::error::BedrockError;

/// [`ModelBuilder`] for Bedrock-hosted models. Nothing is downloaded, so the
/// cache root only has to exist for the trait's sake.
pub struct BedrockModelBuilder {
    config: aws_config::SdkConfig,
    cache: ModelCache,
}

impl BedrockModelBuilder {
    pub fn new(config: aws_config::SdkConfig, cache: ModelCache) -> Self {
        Self { config, cache }
    }

    /// Load AWS configuration from the default credential chain.
    pub async fn from_env(region: Option<&str>, cache: ModelCache) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        Self::new(loader.load().await, cache)
    }
}

#[async_trait]
impl ModelBuilder for BedrockModelBuilder {
    fn cache(&self) -> &ModelCache {
        &self.cache
    }

    async fn describe(&self, model_name: &str) -> Result<ModelProfile, RuntimeError> {
        Ok(catalog::describe(model_name)?)
    }

    async fn make_embedding_model(
        &self,
        model_name: &str,
    ) -> Result<Arc<dyn EmbeddingModel>, RuntimeError> {
        let model_id = catalog::resolve_model_id(model_name);
        let dims = catalog::embedding_dims(model_id)
            .ok_or_else(|| BedrockError::UnsupportedModel(model_name.to_string()))?;
        info!(model_name, model_id, dims, "embedding model ready");
        Ok(Arc::new(TitanEmbedding::new(&self.config, model_id, dims)))
    }

    async fn make_generation_model(
        &self,
        model_name: &str,
        config: &NegotiatedConfig,
    ) -> Result<Box<dyn GenerationModel>, RuntimeError> {
        let model_id = catalog::resolve_model_id(model_name);
        info!(
            model_name,
            model_id,
            max_context_len = config.effective_max_len,
            "generation model ready"
        );
        Ok(Box::new(BedrockChatModel::new(
            &self.config,
            model_id,
            config.model_params(),
        )))
    }
}
