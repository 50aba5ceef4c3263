#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use ragstudio_app::config::{LocalRuntimeConfig, RepositoryBackend, StudioConfig};
use ragstudio_app::studio::Collaborators;
use ragstudio_core::error::ModelError;
use ragstudio_core::models::chat::ChatMessage;
use ragstudio_core::models::sampling::SamplingParams;
use ragstudio_core::runtime::{EmbeddingModel, GenerationModel, ModelParams};
use ragstudio_runtime::builder::{ModelBuilder, ModelCache};
use ragstudio_runtime::error::RuntimeError;
use ragstudio_runtime::negotiate::{NegotiatedConfig, NegotiationPolicy};
use ragstudio_runtime::profile::ModelProfile;
use ragstudio_runtime::resources::FixedProbe;
use ragstudio_storage::local::LocalSnapshotRepository;

pub const MODEL_A: &str = "hosted-a";
pub const MODEL_B: &str = "hosted-b";

/// Letter-frequency embedding, enough to make retrieval deterministic.
pub struct LetterEmbedding(pub String);

#[async_trait]
impl EmbeddingModel for LetterEmbedding {
    fn model_name(&self) -> &str {
        &self.0
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 26];
                for c in text.chars().filter(char::is_ascii_alphabetic) {
                    v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

pub type SamplingLog = Arc<Mutex<Vec<SamplingParams>>>;

/// Answers with the model name and the number of prompt characters.
pub struct EchoLlm {
    name: String,
    params: ModelParams,
    sampling_log: SamplingLog,
}

#[async_trait]
impl GenerationModel for EchoLlm {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> ModelParams {
        self.params
    }

    async fn complete(&self, prompt: &str, sampling: &SamplingParams) -> Result<String, ModelError> {
        self.sampling_log.lock().unwrap().push(sampling.clone());
        Ok(format!("{} read {} chars", self.name, prompt.len()))
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingParams,
    ) -> Result<String, ModelError> {
        self.sampling_log.lock().unwrap().push(sampling.clone());
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(format!("{} says: re {last}", self.name))
    }
}

/// Knows two hosted models; anything else is unknown.
pub struct FakeBuilder {
    cache: ModelCache,
    sampling_log: SamplingLog,
}

impl FakeBuilder {
    pub fn new(cache_root: &Path, sampling_log: SamplingLog) -> Self {
        Self {
            cache: ModelCache::new(cache_root),
            sampling_log,
        }
    }
}

#[async_trait]
impl ModelBuilder for FakeBuilder {
    fn cache(&self) -> &ModelCache {
        &self.cache
    }

    async fn describe(&self, model_name: &str) -> Result<ModelProfile, RuntimeError> {
        match model_name {
            MODEL_A => Ok(ModelProfile::hosted(MODEL_A, 8192)),
            MODEL_B => Ok(ModelProfile::hosted(MODEL_B, 32000)),
            other => Err(RuntimeError::UnknownModel(other.to_string())),
        }
    }

    async fn make_embedding_model(
        &self,
        model_name: &str,
    ) -> Result<Arc<dyn EmbeddingModel>, RuntimeError> {
        Ok(Arc::new(LetterEmbedding(model_name.to_string())))
    }

    async fn make_generation_model(
        &self,
        model_name: &str,
        config: &NegotiatedConfig,
    ) -> Result<Box<dyn GenerationModel>, RuntimeError> {
        Ok(Box::new(EchoLlm {
            name: model_name.to_string(),
            params: config.model_params(),
            sampling_log: self.sampling_log.clone(),
        }))
    }
}

/// A shared "remote" plus a factory for per-process local directories.
pub struct World {
    pub remote: TempDir,
    /// Sampling seen by every generation model built in this world.
    pub sampling_log: SamplingLog,
    scratch: Vec<TempDir>,
}

impl World {
    pub fn new() -> Self {
        Self {
            remote: tempfile::tempdir().unwrap(),
            sampling_log: SamplingLog::default(),
            scratch: Vec::new(),
        }
    }

    pub fn repository(&self) -> Arc<LocalSnapshotRepository> {
        Arc::new(LocalSnapshotRepository::new(self.remote.path()))
    }

    /// Config for a fresh process: new local directories, same remote.
    pub fn config(&mut self) -> StudioConfig {
        let local = tempfile::tempdir().unwrap();
        let root = local.path().to_path_buf();
        self.scratch.push(local);
        StudioConfig {
            models_download_folder: root.join("models"),
            rag_storage_path: root.join("rag_storage"),
            doc_storage_path: root.join("doc_storage"),
            prefs_repo_dir: root.join("prefs_repo"),
            rag_repo_id: None,
            create_new_rag_app: false,
            prefs_repo_id: "prefs-test".to_string(),
            backend: RepositoryBackend::Local {
                root: self.remote.path().to_path_buf(),
            },
            default_model: MODEL_A.to_string(),
            default_embedding_model: "letters".to_string(),
            local_runtime: LocalRuntimeConfig::default(),
        }
    }

    pub fn deps(&self, config: &StudioConfig) -> Collaborators {
        Collaborators {
            repository: self.repository(),
            builder: Arc::new(FakeBuilder::new(
                &config.models_download_folder,
                self.sampling_log.clone(),
            )),
            probe: Arc::new(FixedProbe::default()),
            policy: NegotiationPolicy::default(),
        }
    }

    pub fn write_doc(&mut self, name: &str, body: &str) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        self.scratch.push(dir);
        path
    }
}
