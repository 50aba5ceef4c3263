use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use ragstudio_core::runtime::{EmbeddingModel, GenerationModel};
use ragstudio_runtime::builder::{ModelBuilder, ModelCache};
use ragstudio_runtime::error::RuntimeError;
use ragstudio_runtime::negotiate::{NegotiatedConfig, NegotiationPolicy};
use ragstudio_runtime::profile::ModelProfile;

use crate::chat::VllmChatModel;
use crate::embed::{VllmEmbedding, embedding_dims};
use crate::error::VllmError;
use crate::hub::HubClient;
use crate::server::{self, ReleasedServers, ServeOptions, ServeRequest, ServeTask, ServerProcess};

#[derive(Debug, Clone)]
pub struct VllmOptions {
    pub serve: ServeOptions,
    /// Port of the generation server. Embedding servers take any free port
    /// so a replacement can start before the old one stops.
    pub generation_port: u16,
    pub hub_endpoint: String,
    pub hub_token: Option<String>,
    /// Share of device memory vLLM may claim; keep in step with negotiation.
    pub gpu_memory_utilization: f64,
}

impl Default for VllmOptions {
    fn default() -> Self {
        Self {
            serve: ServeOptions::default(),
            generation_port: 8000,
            hub_endpoint: "https://huggingface.co".to_string(),
            hub_token: None,
            gpu_memory_utilization: NegotiationPolicy::default().memory_utilization,
        }
    }
}

/// [`ModelBuilder`] for models served from local accelerators.
///
/// Profiles come from each model's `config.json`, cached under the
/// generation cache. Weights are downloaded by vLLM into the generation
/// cache or, for embedding models, the embedding cache.
pub struct VllmModelBuilder {
    cache: ModelCache,
    http: reqwest::Client,
    hub: HubClient,
    options: VllmOptions,
    released: ReleasedServers,
}

impl VllmModelBuilder {
    pub fn new(cache: ModelCache, options: VllmOptions) -> Self {
        let http = reqwest::Client::new();
        let hub = HubClient::new(http.clone(), options.hub_endpoint.clone(), options.hub_token.clone());
        Self {
            cache,
            http,
            hub,
            options,
            released: ReleasedServers::default(),
        }
    }

    async fn start(&self, request: &ServeRequest<'_>) -> Result<ServerProcess, VllmError> {
        let mut process = ServerProcess::spawn(&self.options.serve, request, self.released.clone())?;
        process.wait_ready(&self.http, &self.options.serve).await?;
        Ok(process)
    }
}

#[async_trait]
impl ModelBuilder for VllmModelBuilder {
    fn cache(&self) -> &ModelCache {
        &self.cache
    }

    async fn describe(&self, model_name: &str) -> Result<ModelProfile, RuntimeError> {
        let config_json = self
            .hub
            .model_config(&self.cache.generation_dir(), model_name)
            .await?;
        ModelProfile::from_hf_config(model_name, &config_json)
    }

    async fn make_embedding_model(
        &self,
        model_name: &str,
    ) -> Result<Arc<dyn EmbeddingModel>, RuntimeError> {
        let download_dir = self.cache.embedding_dir();
        let config_json = self.hub.model_config(&download_dir, model_name).await?;
        let dims = embedding_dims(&config_json)?;

        let request = ServeRequest {
            model: model_name,
            port: server::free_port()?,
            download_dir: &download_dir,
            task: ServeTask::Embed,
        };
        let process = self.start(&request).await?;
        info!(model_name, dims, base_url = process.base_url(), "embedding model ready");
        Ok(Arc::new(VllmEmbedding::new(self.http.clone(), process, model_name, dims)))
    }

    async fn make_generation_model(
        &self,
        model_name: &str,
        config: &NegotiatedConfig,
    ) -> Result<Box<dyn GenerationModel>, RuntimeError> {
        let download_dir = self.cache.generation_dir();
        let request = ServeRequest {
            model: model_name,
            port: self.options.generation_port,
            download_dir: &download_dir,
            task: ServeTask::Generate {
                precision: config.precision,
                max_model_len: config.effective_max_len,
                tensor_parallel: config.tensor_parallel,
                gpu_memory_utilization: self.options.gpu_memory_utilization,
            },
        };
        let process = self.start(&request).await?;
        info!(
            model_name,
            precision = %config.precision,
            max_context_len = config.effective_max_len,
            tensor_parallel = config.tensor_parallel,
            "generation model ready"
        );
        Ok(Box::new(VllmChatModel::new(
            self.http.clone(),
            process,
            model_name,
            config.model_params(),
        )))
    }

    /// Wait for every server whose handle was dropped to stop listening.
    async fn reclaim(&self) -> Result<(), RuntimeError> {
        for base_url in self.released.drain() {
            server::wait_stopped(&self.http, &base_url, &self.options.serve).await?;
        }
        Ok(())
    }
}
