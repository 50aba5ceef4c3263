use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use ragstudio_core::runtime::{EmbeddingModel, GenerationModel};

use crate::error::RuntimeError;
use crate::negotiate::NegotiatedConfig;
use crate::profile::ModelProfile;

const EMBEDDING_CACHE_DIR: &str = ".hf-cache";
const GENERATION_CACHE_DIR: &str = "generation-models";

/// The one download/cache root every model builder writes under, so a
/// swap back to a previously used model does not fetch weights again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCache {
    root: PathBuf,
}

impl ModelCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn embedding_dir(&self) -> PathBuf {
        self.root.join(EMBEDDING_CACHE_DIR)
    }

    pub fn generation_dir(&self) -> PathBuf {
        self.root.join(GENERATION_CACHE_DIR)
    }

    /// Delete downloaded generation weights. Embedding models are kept.
    pub fn clear_generation_models(&self) -> Result<(), RuntimeError> {
        let dir = self.generation_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            info!(dir = %dir.display(), "cleared generation model cache");
        }
        Ok(())
    }
}

/// Constructs model handles for one runtime.
#[async_trait]
pub trait ModelBuilder: Send + Sync {
    fn cache(&self) -> &ModelCache;

    /// Profile used to negotiate a generation model's configuration.
    async fn describe(&self, model_name: &str) -> Result<ModelProfile, RuntimeError>;

    async fn make_embedding_model(
        &self,
        model_name: &str,
    ) -> Result<Arc<dyn EmbeddingModel>, RuntimeError>;

    /// Build a generation model with exactly the negotiated parameters.
    async fn make_generation_model(
        &self,
        model_name: &str,
        config: &NegotiatedConfig,
    ) -> Result<Box<dyn GenerationModel>, RuntimeError>;

    /// Return memory held by released handles to the device. Called after a
    /// handle is dropped and before the next probe.
    async fn reclaim(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
